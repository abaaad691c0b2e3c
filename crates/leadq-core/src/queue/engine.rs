//! LeadQueue - queue engine 本体
//!
//! 各操作は 1 つの unit of work（`LeadStore::begin` → ... → `commit`）です。
//! 途中で `?` により抜けた場合、tx は drop されてロールバックされます。
//!
//! engine 自身はロックも in-memory state も時計も持ちません。
//! 並行性の調停はすべて store 側（`lock_tenant` / `lease` / 条件付き `update`）に、
//! 時刻は `LeadTx::now` に任せます。

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::options::{PURGE_DAYS_MAX, PURGE_DAYS_MIN, QueueOptions};
use super::overflow;
use super::status::StatusCounts;
use super::tunables::TunablesReader;
use crate::domain::{
    Claim, ClaimToken, ClaimedLead, Lead, LeadId, LeadStatus, QueueError, TenantId,
    TenantQueueConfig, Transition,
};
use crate::ports::{
    IdGenerator, LeadFilter, LeadStore, SystemClock, TunablesProvider, UuidGenerator,
};

/// Multi-tenant lead queue.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct LeadQueue {
    store: Arc<dyn LeadStore>,
    tunables: Arc<dyn TunablesProvider>,
    ids: Arc<dyn IdGenerator>,
    options: QueueOptions,
}

impl LeadQueue {
    pub fn new(
        store: Arc<dyn LeadStore>,
        tunables: Arc<dyn TunablesProvider>,
        options: QueueOptions,
    ) -> Self {
        Self {
            store,
            tunables,
            ids: Arc::new(UuidGenerator::new(Arc::new(SystemClock))),
            options,
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    fn tunables_for<'a>(&'a self, tenant: &'a TenantId) -> TunablesReader<'a> {
        TunablesReader::new(self.tunables.as_ref(), tenant, self.options.bounds)
    }

    /// Insert a NEW lead after running the overflow guard.
    ///
    /// `ttl_days` overrides the tenant's `leads.ttl_days` and must lie within
    /// the TTL bounds.
    pub async fn enqueue<P>(
        &self,
        tenant: &TenantId,
        payload: &P,
        ttl_days: Option<i64>,
    ) -> Result<LeadId, QueueError>
    where
        P: Serialize + ?Sized,
    {
        let payload = self.encode_payload(payload)?;
        let ttl_bounds = self.options.bounds.ttl_days;
        if let Some(days) = ttl_days
            && !ttl_bounds.contains(days)
        {
            return Err(QueueError::validation(format!(
                "ttl_days must be in [{}, {}], got {days}",
                ttl_bounds.min, ttl_bounds.max
            )));
        }

        let reader = self.tunables_for(tenant);
        let ttl_days = match ttl_days {
            Some(days) => days,
            None => reader.ttl_days().await?,
        };
        let max_pending = reader.max_pending().await?;
        let policy = reader.overflow_policy().await?;

        let mut tx = self.store.begin().await?;
        let now = tx.now().await?;
        let lead = Lead::new(
            self.ids.generate_lead_id(),
            tenant.clone(),
            payload,
            now,
            Duration::days(ttl_days),
        );
        let admission = overflow::admit(
            tx.as_mut(),
            tenant,
            u64::try_from(max_pending).unwrap_or(0),
            policy,
        )
        .await?;
        tx.insert(&lead).await?;
        tx.commit().await?;

        debug!(
            %tenant,
            lead_id = %lead.lead_id,
            ttl_days,
            pending = admission.pending,
            dropped = admission.dropped,
            "enqueued lead"
        );
        Ok(lead.lead_id)
    }

    fn encode_payload<P>(&self, payload: &P) -> Result<serde_json::Value, QueueError>
    where
        P: Serialize + ?Sized,
    {
        let value = serde_json::to_value(payload)
            .map_err(|e| QueueError::validation(format!("payload is not valid JSON: {e}")))?;
        let size = serde_json::to_vec(&value)
            .map_err(|e| QueueError::validation(format!("payload is not valid JSON: {e}")))?
            .len();
        if size > self.options.max_payload_bytes {
            return Err(QueueError::validation(format!(
                "payload is {size} bytes, limit is {}",
                self.options.max_payload_bytes
            )));
        }
        Ok(value)
    }

    /// Lease up to `limit` of the oldest unexpired NEW leads under one fresh
    /// claim token.
    ///
    /// Rows held by a concurrent claim are skipped, so this never blocks and
    /// may return fewer than `limit` (or zero) leads.
    pub async fn claim(&self, tenant: &TenantId, limit: u32) -> Result<Claim, QueueError> {
        if limit == 0 || limit > self.options.max_claim_batch {
            return Err(QueueError::validation(format!(
                "claim limit must be in [1, {}], got {limit}",
                self.options.max_claim_batch
            )));
        }

        let token = self.ids.generate_claim_token();
        let mut tx = self.store.begin().await?;
        let now = tx.now().await?;
        let eligible = LeadFilter::new()
            .status(LeadStatus::New)
            .unexpired_at(now);
        let leased = tx.lease(tenant, &eligible, limit).await?;
        if leased.is_empty() {
            tx.commit().await?;
            debug!(%tenant, %token, "claim found no eligible leads");
            return Ok(Claim {
                token,
                leads: Vec::new(),
            });
        }

        tx.update(
            tenant,
            &eligible.ids(&leased),
            &Transition::Claim { token, at: now },
        )
        .await?;
        let leads: Vec<ClaimedLead> = tx
            .fetch(tenant, &leased)
            .await?
            .into_iter()
            .filter(|lead| lead.status == LeadStatus::Claimed && lead.claim_token == Some(token))
            .map(ClaimedLead::from)
            .collect();
        tx.commit().await?;

        debug!(%tenant, %token, limit, claimed = leads.len(), "claimed leads");
        Ok(Claim { token, leads })
    }

    /// CLAIMED -> DELIVERED for the ids still held under `token`.
    ///
    /// Ids that are unknown, terminal or claimed under another token are
    /// skipped. Expiry is not re-checked.
    pub async fn ack(
        &self,
        tenant: &TenantId,
        token: ClaimToken,
        lead_ids: &[LeadId],
    ) -> Result<u64, QueueError> {
        if lead_ids.is_empty() {
            return Ok(0);
        }

        let filter = LeadFilter::new()
            .ids(lead_ids)
            .status(LeadStatus::Claimed)
            .claim_token(token);

        let mut tx = self.store.begin().await?;
        let now = tx.now().await?;
        let delivered = tx
            .update(tenant, &filter, &Transition::Deliver { at: now })
            .await?;
        tx.commit().await?;

        debug!(%tenant, %token, requested = lead_ids.len(), delivered, "acked leads");
        Ok(delivered)
    }

    /// NEW | CLAIMED -> FAILED. Every call increments `attempts`.
    ///
    /// FAILED is terminal: nothing re-queues the lead.
    pub async fn mark_failed(
        &self,
        tenant: &TenantId,
        lead_id: LeadId,
        error: &str,
        keep_claim_token: bool,
    ) -> Result<u64, QueueError> {
        let error: String = error.chars().take(self.options.max_error_len).collect();
        let filter = LeadFilter::new()
            .ids(&[lead_id])
            .statuses(&LeadStatus::PENDING);

        let mut tx = self.store.begin().await?;
        let failed = tx
            .update(
                tenant,
                &filter,
                &Transition::Fail {
                    error,
                    keep_claim_token,
                },
            )
            .await?;
        tx.commit().await?;

        debug!(%tenant, %lead_id, keep_claim_token, failed, "marked lead failed");
        Ok(failed)
    }

    /// CLAIMED -> NEW for claims older than the timeout that have not expired.
    ///
    /// This is the only way a crashed consumer's leads come back.
    pub async fn release_stale_claims(
        &self,
        tenant: &TenantId,
        claim_timeout_minutes: Option<i64>,
    ) -> Result<u64, QueueError> {
        let minutes = self.claim_timeout(tenant, claim_timeout_minutes).await?;

        let mut tx = self.store.begin().await?;
        let filter = stale_claims_filter(tx.now().await?, minutes);
        let released = tx.update(tenant, &filter, &Transition::Release).await?;
        tx.commit().await?;

        if released > 0 {
            info!(%tenant, released, "released stale claims");
        }
        Ok(released)
    }

    /// Rows `release_stale_claims` would touch right now.
    pub async fn count_stale_claims(
        &self,
        tenant: &TenantId,
        claim_timeout_minutes: Option<i64>,
    ) -> Result<u64, QueueError> {
        let minutes = self.claim_timeout(tenant, claim_timeout_minutes).await?;
        self.count_matching(tenant, |now| stale_claims_filter(now, minutes))
            .await
    }

    async fn claim_timeout(
        &self,
        tenant: &TenantId,
        claim_timeout_minutes: Option<i64>,
    ) -> Result<i64, QueueError> {
        let bounds = self.options.bounds.claim_timeout_minutes;
        match claim_timeout_minutes {
            Some(minutes) if !bounds.contains(minutes) => Err(QueueError::validation(format!(
                "claim_timeout_minutes must be in [{}, {}], got {minutes}",
                bounds.min, bounds.max
            ))),
            Some(minutes) => Ok(minutes),
            None => self.tunables_for(tenant).claim_timeout_minutes().await,
        }
    }

    /// NEW | CLAIMED -> EXPIRED once `expires_at <= now`, claimed or not.
    pub async fn expire_overdue(&self, tenant: &TenantId) -> Result<u64, QueueError> {
        let mut tx = self.store.begin().await?;
        let filter = overdue_filter(tx.now().await?);
        let expired = tx.update(tenant, &filter, &Transition::Expire).await?;
        tx.commit().await?;

        if expired > 0 {
            info!(%tenant, expired, "expired overdue leads");
        }
        Ok(expired)
    }

    pub async fn count_overdue(&self, tenant: &TenantId) -> Result<u64, QueueError> {
        self.count_matching(tenant, overdue_filter).await
    }

    /// Delete terminal rows created more than `older_than_days` ago.
    ///
    /// `statuses` must be non-empty and terminal; NEW and CLAIMED are never
    /// purged.
    pub async fn purge_old(
        &self,
        tenant: &TenantId,
        older_than_days: i64,
        statuses: &[LeadStatus],
    ) -> Result<u64, QueueError> {
        check_purge_args(older_than_days, statuses)?;

        let mut tx = self.store.begin().await?;
        let filter = purge_filter(tx.now().await?, older_than_days, statuses);
        let purged = tx.delete(tenant, &filter).await?;
        tx.commit().await?;

        if purged > 0 {
            info!(%tenant, older_than_days, purged, "purged old leads");
        }
        Ok(purged)
    }

    pub async fn count_purgeable(
        &self,
        tenant: &TenantId,
        older_than_days: i64,
        statuses: &[LeadStatus],
    ) -> Result<u64, QueueError> {
        check_purge_args(older_than_days, statuses)?;
        self.count_matching(tenant, |now| purge_filter(now, older_than_days, statuses))
            .await
    }

    /// Row counts per status.
    pub async fn counts(&self, tenant: &TenantId) -> Result<StatusCounts, QueueError> {
        let mut tx = self.store.begin().await?;
        let mut counts = StatusCounts::default();
        for status in LeadStatus::ALL {
            let n = tx.count(tenant, &LeadFilter::new().status(status)).await?;
            counts.set(status, n);
        }
        tx.commit().await?;
        Ok(counts)
    }

    /// Current effective tunables for `tenant`, clamped as the engine sees them.
    pub async fn tenant_config(&self, tenant: &TenantId) -> Result<TenantQueueConfig, QueueError> {
        self.tunables_for(tenant).snapshot().await
    }

    /// Count rows matching a filter built from the store's current time.
    async fn count_matching<F>(&self, tenant: &TenantId, filter: F) -> Result<u64, QueueError>
    where
        F: FnOnce(DateTime<Utc>) -> LeadFilter,
    {
        let mut tx = self.store.begin().await?;
        let filter = filter(tx.now().await?);
        let n = tx.count(tenant, &filter).await?;
        tx.commit().await?;
        Ok(n)
    }
}

fn overdue_filter(now: DateTime<Utc>) -> LeadFilter {
    LeadFilter::new()
        .statuses(&LeadStatus::PENDING)
        .expired_at(now)
}

fn stale_claims_filter(now: DateTime<Utc>, claim_timeout_minutes: i64) -> LeadFilter {
    LeadFilter::new()
        .status(LeadStatus::Claimed)
        .claimed_before(now - Duration::minutes(claim_timeout_minutes))
        .unexpired_at(now)
}

fn check_purge_args(older_than_days: i64, statuses: &[LeadStatus]) -> Result<(), QueueError> {
    if !(PURGE_DAYS_MIN..=PURGE_DAYS_MAX).contains(&older_than_days) {
        return Err(QueueError::validation(format!(
            "older_than_days must be in [{PURGE_DAYS_MIN}, {PURGE_DAYS_MAX}], got {older_than_days}"
        )));
    }
    if statuses.is_empty() {
        return Err(QueueError::validation("purge needs at least one status"));
    }
    if let Some(active) = statuses.iter().find(|s| !s.is_terminal()) {
        return Err(QueueError::validation(format!(
            "refusing to purge non-terminal status {active}"
        )));
    }
    Ok(())
}

fn purge_filter(now: DateTime<Utc>, older_than_days: i64, statuses: &[LeadStatus]) -> LeadFilter {
    LeadFilter::new()
        .statuses(statuses)
        .created_before(now - Duration::days(older_than_days))
}
