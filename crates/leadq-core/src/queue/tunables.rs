//! Reads tenant tunables at call time and clamps them to their bounds.
//!
//! Nothing here is cached: two calls may see different values if an operator
//! changed a setting in between.

use tracing::warn;

use crate::domain::policy::{DEFAULT_CLAIM_TIMEOUT_MINUTES, DEFAULT_MAX_PENDING, DEFAULT_TTL_DAYS};
use crate::domain::{
    Bounds, OverflowPolicy, QueueError, TenantId, TenantQueueConfig, TunableBounds, keys,
};
use crate::ports::TunablesProvider;

pub(crate) struct TunablesReader<'a> {
    provider: &'a dyn TunablesProvider,
    tenant: &'a TenantId,
    bounds: TunableBounds,
}

impl<'a> TunablesReader<'a> {
    pub(crate) fn new(
        provider: &'a dyn TunablesProvider,
        tenant: &'a TenantId,
        bounds: TunableBounds,
    ) -> Self {
        Self {
            provider,
            tenant,
            bounds,
        }
    }

    async fn bounded_int(&self, key: &str, default: i64, bounds: Bounds) -> Result<i64, QueueError> {
        let raw = self
            .provider
            .get_int(self.tenant, key, default, bounds.min, bounds.max)
            .await?;
        if !bounds.contains(raw) {
            warn!(
                tenant = %self.tenant,
                key,
                value = raw,
                min = bounds.min,
                max = bounds.max,
                "tunables provider returned out-of-range value; clamping"
            );
        }
        Ok(bounds.clamp(raw))
    }

    pub(crate) async fn ttl_days(&self) -> Result<i64, QueueError> {
        self.bounded_int(keys::TTL_DAYS, DEFAULT_TTL_DAYS, self.bounds.ttl_days)
            .await
    }

    pub(crate) async fn max_pending(&self) -> Result<i64, QueueError> {
        self.bounded_int(keys::MAX_PENDING, DEFAULT_MAX_PENDING, self.bounds.max_pending)
            .await
    }

    pub(crate) async fn claim_timeout_minutes(&self) -> Result<i64, QueueError> {
        self.bounded_int(
            keys::CLAIM_TIMEOUT_MINUTES,
            DEFAULT_CLAIM_TIMEOUT_MINUTES,
            self.bounds.claim_timeout_minutes,
        )
        .await
    }

    pub(crate) async fn overflow_policy(&self) -> Result<OverflowPolicy, QueueError> {
        let default = OverflowPolicy::default();
        let raw = self
            .provider
            .get_str(self.tenant, keys::OVERFLOW_POLICY, default.as_str())
            .await?;
        Ok(raw.parse().unwrap_or_else(|_| {
            warn!(
                tenant = %self.tenant,
                value = %raw,
                fallback = %default,
                "unknown overflow policy; using default"
            );
            default
        }))
    }

    pub(crate) async fn snapshot(&self) -> Result<TenantQueueConfig, QueueError> {
        Ok(TenantQueueConfig {
            ttl_days: self.ttl_days().await?,
            max_pending: self.max_pending().await?,
            claim_timeout_minutes: self.claim_timeout_minutes().await?,
            overflow_policy: self.overflow_policy().await?,
        })
    }
}
