//! PostgreSQL backend (feature `postgres`).
//!
//! - `leads_queue`: one row per lead, the source of truth
//! - `tenant_settings`: jsonb key/value tunables per tenant
//!
//! `lease` is `SELECT ... FOR UPDATE SKIP LOCKED`; `lock_tenant` is a
//! transaction-scoped advisory lock on the tenant id.

mod schema;
mod store;
mod tunables;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::domain::StoreError;

pub use self::schema::init_schema;
pub use self::store::PgLeadStore;
pub use self::tunables::PgTunables;

/// Connection settings for the Postgres backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl PgConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
        }
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub async fn connect(&self) -> Result<PgPool, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await?;
        Ok(pool)
    }
}
