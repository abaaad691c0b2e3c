//! InMemoryTunables - 開発・テスト用の設定ストア
//!
//! 値は設定テーブルと同じく JSON で持つので、文字列の数値や不正な型も再現できます。

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{StoreError, TenantId};
use crate::ports::{TunablesProvider, TunablesWriter};
use crate::ports::tunables::{json_to_int, json_to_str};

#[derive(Default)]
pub struct InMemoryTunables {
    values: RwLock<HashMap<(TenantId, String), serde_json::Value>>,
}

impl InMemoryTunables {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, tenant: &TenantId, key: &str, value: serde_json::Value) {
        self.values
            .write()
            .await
            .insert((tenant.clone(), key.to_string()), value);
    }

    pub async fn remove(&self, tenant: &TenantId, key: &str) {
        self.values
            .write()
            .await
            .remove(&(tenant.clone(), key.to_string()));
    }

    async fn lookup(&self, tenant: &TenantId, key: &str) -> Option<serde_json::Value> {
        self.values
            .read()
            .await
            .get(&(tenant.clone(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl TunablesWriter for InMemoryTunables {
    async fn get_json(
        &self,
        tenant: &TenantId,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(self.lookup(tenant, key).await)
    }

    async fn set_json(
        &self,
        tenant: &TenantId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        self.set(tenant, key, value).await;
        Ok(())
    }
}

#[async_trait]
impl TunablesProvider for InMemoryTunables {
    async fn get_int(
        &self,
        tenant: &TenantId,
        key: &str,
        default: i64,
        min: i64,
        max: i64,
    ) -> Result<i64, StoreError> {
        let value = self
            .lookup(tenant, key)
            .await
            .as_ref()
            .and_then(json_to_int)
            .unwrap_or(default);
        Ok(value.clamp(min, max))
    }

    async fn get_str(
        &self,
        tenant: &TenantId,
        key: &str,
        default: &str,
    ) -> Result<String, StoreError> {
        Ok(self
            .lookup(tenant, key)
            .await
            .as_ref()
            .and_then(json_to_str)
            .unwrap_or_else(|| default.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn absent_values_fall_back_to_default() {
        let tunables = InMemoryTunables::new();
        let tenant = TenantId::new("default").unwrap();
        assert_eq!(
            tunables.get_int(&tenant, "leads.ttl_days", 14, 1, 90).await.unwrap(),
            14
        );
        assert_eq!(
            tunables
                .get_str(&tenant, "leads.overflow_policy", "DROP_OLDEST_NEW")
                .await
                .unwrap(),
            "DROP_OLDEST_NEW"
        );
    }

    #[tokio::test]
    async fn values_are_per_tenant_and_clamped() {
        let tunables = InMemoryTunables::new();
        let a = TenantId::new("a").unwrap();
        let b = TenantId::new("b").unwrap();
        tunables.set(&a, "leads.ttl_days", json!(500)).await;
        tunables.set(&b, "leads.ttl_days", json!("3")).await;

        assert_eq!(tunables.get_int(&a, "leads.ttl_days", 14, 1, 90).await.unwrap(), 90);
        assert_eq!(tunables.get_int(&b, "leads.ttl_days", 14, 1, 90).await.unwrap(), 3);

        tunables.remove(&b, "leads.ttl_days").await;
        assert_eq!(tunables.get_int(&b, "leads.ttl_days", 14, 1, 90).await.unwrap(), 14);
    }
}
