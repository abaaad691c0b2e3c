//! Domain identifiers (strongly-typed IDs).
//!
//! # UUID ベースの ID + ジェネリック実装
//! Lead と claim は外部（CRM / agency）とやり取りするため、素の UUID 文字列として
//! 表示・パースできる必要があります。
//! 一方でコード内では Phantom type パターンで型を分け、
//! `LeadId` と `ClaimToken` を取り違えられないようにしています。
//!
//! ## Phantom Type パターン
//! `Id<T>` が共通実装を持ち、`T` は実行時に使わないマーカー型です。

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use uuid::Uuid;

/// IdMarker は各 ID 型のマーカー trait
///
/// エラーメッセージで使う種別名を提供します。
pub trait IdMarker: Send + Sync + 'static {
    /// 種別名（例: "lead", "claim_token"）
    fn kind() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
pub struct Id<T: IdMarker> {
    uuid: Uuid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid,
            _marker: PhantomData,
        }
    }

    pub fn as_uuid(&self) -> Uuid {
        self.uuid
    }
}

// derive だと T にも境界が付いてしまうので手で実装する
impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdMarker> Copy for Id<T> {}

impl<T: IdMarker> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.uuid == other.uuid
    }
}

impl<T: IdMarker> Eq for Id<T> {}

impl<T: IdMarker> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.uuid.hash(state);
    }
}

impl<T: IdMarker> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.uuid.cmp(&other.uuid)
    }
}

impl<T: IdMarker> From<Uuid> for Id<T> {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uuid)
    }
}

impl<T: IdMarker> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", T::kind(), self.uuid)
    }
}

/// ID 文字列のパース失敗
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: {input}")]
pub struct ParseIdError {
    pub kind: &'static str,
    pub input: String,
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self::from_uuid)
            .map_err(|_| ParseIdError {
                kind: T::kind(),
                input: s.to_string(),
            })
    }
}

impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.uuid.serialize(serializer)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Uuid::deserialize(deserializer).map(Self::from_uuid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Lead のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LeadMarker {}

impl IdMarker for LeadMarker {
    fn kind() -> &'static str {
        "lead_id"
    }
}

/// Claim のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClaimMarker {}

impl IdMarker for ClaimMarker {
    fn kind() -> &'static str {
        "claim_token"
    }
}

/// Identifier of a queued lead (assigned at enqueue, immutable).
pub type LeadId = Id<LeadMarker>;

/// Identifier of one `claim` call; required to ack the leads it returned.
pub type ClaimToken = Id<ClaimMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_as_plain_uuid() {
        let uuid = Uuid::new_v4();
        let lead = LeadId::from_uuid(uuid);
        let token = ClaimToken::from_uuid(uuid);

        assert_eq!(lead.to_string(), uuid.to_string());
        assert_eq!(token.to_string(), uuid.to_string());
        assert_eq!(format!("{lead:?}"), format!("lead_id({uuid})"));

        // let _: LeadId = token; // <- does not compile
    }

    #[test]
    fn parse_round_trips_and_rejects_garbage() {
        let lead = LeadId::from_uuid(Uuid::new_v4());
        let parsed: LeadId = lead.to_string().parse().unwrap();
        assert_eq!(parsed, lead);

        let err = "not-a-uuid".parse::<ClaimToken>().unwrap_err();
        assert_eq!(err.kind, "claim_token");
    }

    #[test]
    fn serializes_as_uuid_string() {
        let lead = LeadId::from_uuid(Uuid::new_v4());
        let json = serde_json::to_string(&lead).unwrap();
        assert_eq!(json, format!("\"{}\"", lead.as_uuid()));
        let back: LeadId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lead);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<LeadId>(), size_of::<Uuid>());
        assert_eq!(size_of::<ClaimToken>(), 16);
    }
}
