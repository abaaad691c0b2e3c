//! LeadStore port - lead の正本（source of truth）
//!
//! LeadStore は queue engine が必要とする唯一の transactional storage です。
//!
//! # 設計原則
//! - 1 operation = 1 unit of work（`begin` → 操作 → `commit`）
//! - commit せずに drop した unit of work は何も残さない（rollback）
//! - `lease` は「条件に合う行を最大 N 件、他の in-flight unit が掴んでいる行を
//!   飛ばしてロックする」primitive（Postgres では `FOR UPDATE SKIP LOCKED`）
//! - `update` は条件付き更新。マッチしない行はエラーではなく 0 件
//! - 時刻は store の時計（`LeadTx::now`）だけを使う。ホストごとの時計のずれで
//!   stale 判定や TTL が狂わないように
//! - engine はプロセス内ロックも in-memory queue state も持たない

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ClaimToken, Lead, LeadId, LeadStatus, StoreError, TenantId, Transition};

/// Row selection used by `count`, `lease`, `update` and `delete`.
///
/// Every condition is ANDed. `tenant` is always applied by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeadFilter {
    /// Restrict to these ids (`None` = any id).
    pub lead_ids: Option<Vec<LeadId>>,
    /// Status must be one of these (empty = any status).
    pub statuses: Vec<LeadStatus>,
    pub claim_token: Option<ClaimToken>,
    /// `expires_at > t`
    pub unexpired_at: Option<DateTime<Utc>>,
    /// `expires_at <= t`
    pub expired_at: Option<DateTime<Utc>>,
    /// `claimed_at < t`
    pub claimed_before: Option<DateTime<Utc>>,
    /// `created_at < t`
    pub created_before: Option<DateTime<Utc>>,
}

impl LeadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(self, status: LeadStatus) -> Self {
        self.statuses(&[status])
    }

    pub fn statuses(mut self, statuses: &[LeadStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn ids(mut self, ids: &[LeadId]) -> Self {
        self.lead_ids = Some(ids.to_vec());
        self
    }

    pub fn claim_token(mut self, token: ClaimToken) -> Self {
        self.claim_token = Some(token);
        self
    }

    pub fn unexpired_at(mut self, now: DateTime<Utc>) -> Self {
        self.unexpired_at = Some(now);
        self
    }

    pub fn expired_at(mut self, now: DateTime<Utc>) -> Self {
        self.expired_at = Some(now);
        self
    }

    pub fn claimed_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.claimed_before = Some(cutoff);
        self
    }

    pub fn created_before(mut self, cutoff: DateTime<Utc>) -> Self {
        self.created_before = Some(cutoff);
        self
    }

    /// Evaluate the filter against a record (used by the in-memory store).
    pub fn matches(&self, lead: &Lead) -> bool {
        if let Some(ids) = &self.lead_ids {
            if !ids.contains(&lead.lead_id) {
                return false;
            }
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&lead.status) {
            return false;
        }
        if let Some(token) = self.claim_token {
            if lead.claim_token != Some(token) {
                return false;
            }
        }
        if let Some(now) = self.unexpired_at {
            if lead.expires_at <= now {
                return false;
            }
        }
        if let Some(now) = self.expired_at {
            if lead.expires_at > now {
                return false;
            }
        }
        if let Some(cutoff) = self.claimed_before {
            match lead.claimed_at {
                Some(claimed_at) if claimed_at < cutoff => {}
                _ => return false,
            }
        }
        if let Some(cutoff) = self.created_before {
            if lead.created_at >= cutoff {
                return false;
            }
        }
        true
    }
}

/// LeadStore は unit of work を開始するだけの入口
#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LeadTx>, StoreError>;
}

/// One atomic unit of work against the lead table.
///
/// Dropping a `LeadTx` without calling `commit` discards every change it made.
#[async_trait]
pub trait LeadTx: Send {
    /// Serialize producers of `tenant` until this unit ends.
    ///
    /// Claims are not blocked by this; they rely on `lease`.
    async fn lock_tenant(&mut self, tenant: &TenantId) -> Result<(), StoreError>;

    /// The store's current time, fixed for the rest of this unit.
    ///
    /// Every timestamp written and every cutoff compared against comes from
    /// here, never from the calling host.
    async fn now(&mut self) -> Result<DateTime<Utc>, StoreError>;

    async fn count(&mut self, tenant: &TenantId, filter: &LeadFilter) -> Result<u64, StoreError>;

    /// Select up to `limit` matching rows, oldest `created_at` first, and lock
    /// them for the rest of this unit. Rows locked by another in-flight unit
    /// are skipped, never waited on.
    async fn lease(
        &mut self,
        tenant: &TenantId,
        filter: &LeadFilter,
        limit: u32,
    ) -> Result<Vec<LeadId>, StoreError>;

    /// Apply `transition` to every matching row whose status allows it.
    /// Returns the number of rows changed.
    async fn update(
        &mut self,
        tenant: &TenantId,
        filter: &LeadFilter,
        transition: &Transition,
    ) -> Result<u64, StoreError>;

    async fn insert(&mut self, lead: &Lead) -> Result<(), StoreError>;

    /// Load rows by id, oldest first. Unknown ids are skipped.
    async fn fetch(&mut self, tenant: &TenantId, ids: &[LeadId]) -> Result<Vec<Lead>, StoreError>;

    async fn delete(&mut self, tenant: &TenantId, filter: &LeadFilter) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn lead_at(created: DateTime<Utc>) -> Lead {
        Lead::new(
            LeadId::from_uuid(Uuid::new_v4()),
            TenantId::new("default").unwrap(),
            serde_json::json!({}),
            created,
            Duration::days(1),
        )
    }

    #[test]
    fn empty_filter_matches_everything() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(LeadFilter::new().matches(&lead_at(now)));
    }

    #[test]
    fn expiry_boundary_is_inclusive_for_expired() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let lead = lead_at(created);
        let deadline = lead.expires_at;

        assert!(LeadFilter::new().expired_at(deadline).matches(&lead));
        assert!(!LeadFilter::new().unexpired_at(deadline).matches(&lead));
        assert!(LeadFilter::new()
            .unexpired_at(deadline - Duration::seconds(1))
            .matches(&lead));
    }

    #[test]
    fn claimed_before_requires_a_claim() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut lead = lead_at(created);
        let cutoff = created + Duration::hours(1);
        assert!(!LeadFilter::new().claimed_before(cutoff).matches(&lead));

        lead.apply(&Transition::Claim {
            token: ClaimToken::from_uuid(Uuid::new_v4()),
            at: created,
        });
        assert!(LeadFilter::new().claimed_before(cutoff).matches(&lead));
        assert!(!LeadFilter::new().claimed_before(created).matches(&lead));
    }

    #[test]
    fn token_and_ids_must_both_match() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut lead = lead_at(created);
        let token = ClaimToken::from_uuid(Uuid::new_v4());
        lead.apply(&Transition::Claim { token, at: created });

        let filter = LeadFilter::new().ids(&[lead.lead_id]).claim_token(token);
        assert!(filter.matches(&lead));

        let other = ClaimToken::from_uuid(Uuid::new_v4());
        assert!(!LeadFilter::new().ids(&[lead.lead_id]).claim_token(other).matches(&lead));
        assert!(!LeadFilter::new().ids(&[]).matches(&lead));
    }
}
