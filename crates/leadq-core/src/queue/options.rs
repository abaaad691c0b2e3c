//! Engine-wide limits passed to `LeadQueue::new`.

use crate::domain::TunableBounds;

/// Hard limits that do not vary per tenant.
///
/// Tenant-tunable values (TTL, max pending, ...) live in the tunables provider,
/// not here. Only the ranges they are clamped into are configured here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueOptions {
    /// Maximum serialized JSON size of a payload, in bytes.
    pub max_payload_bytes: usize,

    /// Upper bound for `claim(limit)`.
    pub max_claim_batch: u32,

    /// `mark_failed` error text is truncated to this many characters.
    pub max_error_len: usize,

    pub bounds: TunableBounds,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            max_payload_bytes: 64 * 1024,
            max_claim_batch: 500,
            max_error_len: 2000,
            bounds: TunableBounds::default(),
        }
    }
}

impl QueueOptions {
    /// Lowers the `max_pending` floor, e.g. for tiny queues in tests.
    pub fn with_max_pending_floor(mut self, min: i64) -> Self {
        self.bounds.max_pending.min = min.clamp(1, self.bounds.max_pending.max);
        self
    }
}

/// Older-than bounds accepted by `purge_old`, in days.
pub const PURGE_DAYS_MIN: i64 = 1;
pub const PURGE_DAYS_MAX: i64 = 3650;
