use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{FromRow, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::domain::{
    ClaimToken, Lead, LeadId, LeadStatus, StoreError, TenantId, Transition,
};
use crate::ports::{LeadFilter, LeadStore, LeadTx};

const COLUMNS: &str = "lead_id, tenant_id, status, payload, created_at, expires_at, \
                       claim_token, claimed_at, delivered_at, attempts, last_error";

/// `LeadStore` over a shared connection pool.
#[derive(Clone)]
pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn begin(&self) -> Result<Box<dyn LeadTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

/// One database transaction. sqlx rolls it back when dropped uncommitted.
struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LeadTx for PgTx {
    async fn lock_tenant(&mut self, tenant: &TenantId) -> Result<(), StoreError> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(tenant.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn now(&mut self) -> Result<DateTime<Utc>, StoreError> {
        // transaction start time, shared by every statement in this unit
        let now: DateTime<Utc> = sqlx::query_scalar("SELECT now()")
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(now)
    }

    async fn count(&mut self, tenant: &TenantId, filter: &LeadFilter) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM leads_queue");
        push_filter(&mut qb, tenant, filter);
        let n: i64 = qb.build_query_scalar().fetch_one(&mut *self.tx).await?;
        Ok(u64::try_from(n).unwrap_or(0))
    }

    async fn lease(
        &mut self,
        tenant: &TenantId,
        filter: &LeadFilter,
        limit: u32,
    ) -> Result<Vec<LeadId>, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT lead_id FROM leads_queue");
        push_filter(&mut qb, tenant, filter);
        qb.push(" ORDER BY created_at ASC, lead_id ASC LIMIT ")
            .push_bind(i64::from(limit))
            .push(" FOR UPDATE SKIP LOCKED");
        let ids: Vec<Uuid> = qb.build_query_scalar().fetch_all(&mut *self.tx).await?;
        Ok(ids.into_iter().map(LeadId::from_uuid).collect())
    }

    async fn update(
        &mut self,
        tenant: &TenantId,
        filter: &LeadFilter,
        transition: &Transition,
    ) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE leads_queue");
        push_set(&mut qb, transition);
        push_filter(&mut qb, tenant, filter);

        // only rows whose current status allows the edge
        let target = transition.target();
        let sources: Vec<String> = LeadStatus::ALL
            .iter()
            .filter(|s| s.can_transition_to(target))
            .map(|s| s.as_str().to_string())
            .collect();
        qb.push(" AND status = ANY(").push_bind(sources).push(")");

        let result = qb.build().execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn insert(&mut self, lead: &Lead) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO leads_queue ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        );
        sqlx::query(&sql)
            .bind(lead.lead_id.as_uuid())
            .bind(lead.tenant_id.as_str())
            .bind(lead.status.as_str())
            .bind(&lead.payload)
            .bind(lead.created_at)
            .bind(lead.expires_at)
            .bind(lead.claim_token.map(|t| t.as_uuid()))
            .bind(lead.claimed_at)
            .bind(lead.delivered_at)
            .bind(i32::try_from(lead.attempts).unwrap_or(i32::MAX))
            .bind(lead.last_error.as_deref())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn fetch(&mut self, tenant: &TenantId, ids: &[LeadId]) -> Result<Vec<Lead>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {COLUMNS} FROM leads_queue \
             WHERE tenant_id = $1 AND lead_id = ANY($2) \
             ORDER BY created_at ASC, lead_id ASC"
        );
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows: Vec<LeadRow> = sqlx::query_as(&sql)
            .bind(tenant.as_str())
            .bind(uuids)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.into_iter().map(Lead::try_from).collect()
    }

    async fn delete(&mut self, tenant: &TenantId, filter: &LeadFilter) -> Result<u64, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("DELETE FROM leads_queue");
        push_filter(&mut qb, tenant, filter);
        let result = qb.build().execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn push_filter(qb: &mut QueryBuilder<'static, Postgres>, tenant: &TenantId, filter: &LeadFilter) {
    qb.push(" WHERE tenant_id = ")
        .push_bind(tenant.as_str().to_string());

    if let Some(ids) = &filter.lead_ids {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        qb.push(" AND lead_id = ANY(").push_bind(uuids).push(")");
    }
    if !filter.statuses.is_empty() {
        let statuses: Vec<String> = filter
            .statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        qb.push(" AND status = ANY(").push_bind(statuses).push(")");
    }
    if let Some(token) = filter.claim_token {
        qb.push(" AND claim_token = ").push_bind(token.as_uuid());
    }
    if let Some(t) = filter.unexpired_at {
        qb.push(" AND expires_at > ").push_bind(t);
    }
    if let Some(t) = filter.expired_at {
        qb.push(" AND expires_at <= ").push_bind(t);
    }
    if let Some(t) = filter.claimed_before {
        qb.push(" AND claimed_at < ").push_bind(t);
    }
    if let Some(t) = filter.created_before {
        qb.push(" AND created_at < ").push_bind(t);
    }
}

/// SET clause for a transition. Mirrors `Lead::apply`.
fn push_set(qb: &mut QueryBuilder<'static, Postgres>, transition: &Transition) {
    qb.push(" SET status = ")
        .push_bind(transition.target().as_str());

    match transition {
        Transition::Claim { token, at } => {
            qb.push(", claim_token = ")
                .push_bind(token.as_uuid())
                .push(", claimed_at = ")
                .push_bind(*at);
        }
        Transition::Deliver { at } => {
            qb.push(", delivered_at = ")
                .push_bind(*at)
                .push(", claim_token = NULL");
        }
        Transition::Release => {
            qb.push(", claim_token = NULL, claimed_at = NULL");
        }
        Transition::Expire => {
            qb.push(", claim_token = NULL");
        }
        Transition::Drop { reason } => {
            qb.push(", claim_token = NULL, last_error = ")
                .push_bind(reason.clone());
        }
        Transition::Fail {
            error,
            keep_claim_token,
        } => {
            qb.push(", attempts = attempts + 1, last_error = ")
                .push_bind(error.clone());
            if !keep_claim_token {
                qb.push(", claim_token = NULL");
            }
        }
    }
}

#[derive(Debug, FromRow)]
struct LeadRow {
    lead_id: Uuid,
    tenant_id: String,
    status: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    claim_token: Option<Uuid>,
    claimed_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    attempts: i32,
    last_error: Option<String>,
}

impl TryFrom<LeadRow> for Lead {
    type Error = StoreError;

    fn try_from(row: LeadRow) -> Result<Self, Self::Error> {
        let lead_id = row.lead_id;
        let corrupt = |reason: String| StoreError::CorruptRow {
            lead_id: lead_id.to_string(),
            reason,
        };

        let status: LeadStatus = row.status.parse().map_err(|e| corrupt(format!("{e}")))?;
        let tenant_id = TenantId::new(row.tenant_id).map_err(|e| corrupt(e.to_string()))?;
        let attempts = u32::try_from(row.attempts)
            .map_err(|_| corrupt(format!("negative attempts {}", row.attempts)))?;

        Ok(Lead {
            lead_id: LeadId::from_uuid(lead_id),
            tenant_id,
            status,
            payload: row.payload,
            created_at: row.created_at,
            expires_at: row.expires_at,
            claim_token: row.claim_token.map(ClaimToken::from_uuid),
            claimed_at: row.claimed_at,
            delivered_at: row.delivered_at,
            attempts,
            last_error: row.last_error,
        })
    }
}
