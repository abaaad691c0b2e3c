use async_trait::async_trait;
use sqlx::postgres::PgPool;

use crate::domain::{StoreError, TenantId};
use crate::ports::tunables::{json_to_int, json_to_str};
use crate::ports::{TunablesProvider, TunablesWriter};

/// Tunables backed by the `tenant_settings` table. Every read hits the database.
#[derive(Clone)]
pub struct PgTunables {
    pool: PgPool,
}

impl PgTunables {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TunablesWriter for PgTunables {
    async fn get_json(
        &self,
        tenant: &TenantId,
        key: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        let value = sqlx::query_scalar("SELECT value FROM tenant_settings WHERE tenant_id = $1 AND key = $2")
            .bind(tenant.as_str())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set_json(
        &self,
        tenant: &TenantId,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO tenant_settings (tenant_id, key, value, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (tenant_id, key) DO UPDATE SET
                value = EXCLUDED.value,
                updated_at = NOW()
            "#,
        )
        .bind(tenant.as_str())
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TunablesProvider for PgTunables {
    async fn get_int(
        &self,
        tenant: &TenantId,
        key: &str,
        default: i64,
        min: i64,
        max: i64,
    ) -> Result<i64, StoreError> {
        let value = self
            .get_json(tenant, key)
            .await?
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
            .get_json(tenant, key)
            .await?
            .as_ref()
            .and_then(json_to_str)
            .unwrap_or_else(|| default.to_string()))
    }
}
