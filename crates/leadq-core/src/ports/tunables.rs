//! TunablesProvider port - テナント別の実行時設定
//!
//! # 設計原則
//! - キャッシュしない: engine は毎回の操作で読み直す（管理画面の変更が次の呼び出しから効く）
//! - 値が無い / 型が違う場合は `default` を返す
//! - `min` / `max` は provider 側でも守るが、engine 側でも clamp する

use async_trait::async_trait;

use crate::domain::{StoreError, TenantId};

#[async_trait]
pub trait TunablesProvider: Send + Sync {
    async fn get_int(
        &self,
        tenant: &TenantId,
        key: &str,
        default: i64,
        min: i64,
        max: i64,
    ) -> Result<i64, StoreError>;

    async fn get_str(&self, tenant: &TenantId, key: &str, default: &str)
    -> Result<String, StoreError>;
}

/// Raw read/write access to the settings table, used by admin tooling.
#[async_trait]
pub trait TunablesWriter: Send + Sync {
    async fn get_json(
        &self,
        tenant: &TenantId,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    /// Insert or overwrite one setting.
    async fn set_json(
        &self,
        tenant: &TenantId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// Interpret a stored JSON value as an integer the way the settings table does:
/// numbers (truncated) and numeric strings are accepted, anything else is `None`.
pub fn json_to_int(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Interpret a stored JSON value as a string (`null` = absent).
pub fn json_to_str(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
