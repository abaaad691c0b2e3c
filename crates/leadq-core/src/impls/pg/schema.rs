use sqlx::postgres::PgPool;
use tracing::info;

use crate::domain::StoreError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS leads_queue (
    lead_id      UUID PRIMARY KEY,
    tenant_id    TEXT NOT NULL,
    status       TEXT NOT NULL
                 CHECK (status IN ('NEW', 'CLAIMED', 'DELIVERED', 'EXPIRED', 'DROPPED', 'FAILED')),
    payload      JSONB NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL,
    expires_at   TIMESTAMPTZ NOT NULL,
    claim_token  UUID,
    claimed_at   TIMESTAMPTZ,
    delivered_at TIMESTAMPTZ,
    attempts     INTEGER NOT NULL DEFAULT 0,
    last_error   TEXT
);

CREATE INDEX IF NOT EXISTS leads_queue_fifo_idx
    ON leads_queue (tenant_id, status, created_at, lead_id);

CREATE INDEX IF NOT EXISTS leads_queue_expiry_idx
    ON leads_queue (tenant_id, status, expires_at);

CREATE INDEX IF NOT EXISTS leads_queue_claimed_idx
    ON leads_queue (tenant_id, claimed_at)
    WHERE status = 'CLAIMED';

CREATE TABLE IF NOT EXISTS tenant_settings (
    tenant_id  TEXT NOT NULL,
    key        TEXT NOT NULL,
    value      JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (tenant_id, key)
);
"#;

/// Create tables and indexes if they do not exist yet.
pub async fn init_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    info!("schema ready");
    Ok(())
}
