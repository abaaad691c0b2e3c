//! Lead status state machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lead status.
///
/// State transitions:
/// - (enqueue) -> New
/// - New -> Dropped (overflow guard evicts the oldest unclaimed work)
/// - New -> Claimed -> Delivered
/// - Claimed -> New (stale claim released)
/// - New | Claimed -> Expired (TTL passed)
/// - New | Claimed -> Failed (consumer reported failure)
///
/// Terminal states are only left by purge (row deletion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    /// Waiting to be claimed.
    New,

    /// Leased to a consumer under a claim token.
    Claimed,

    /// Acked by the consumer that held the claim.
    Delivered,

    /// TTL passed before delivery.
    Expired,

    /// Evicted by the overflow guard.
    Dropped,

    /// Consumer reported a failure (not retried).
    Failed,
}

impl LeadStatus {
    /// Statuses that count towards `max_pending`.
    pub const PENDING: [LeadStatus; 2] = [LeadStatus::New, LeadStatus::Claimed];

    /// Statuses that purge may delete.
    pub const TERMINAL: [LeadStatus; 4] = [
        LeadStatus::Delivered,
        LeadStatus::Expired,
        LeadStatus::Dropped,
        LeadStatus::Failed,
    ];

    pub const ALL: [LeadStatus; 6] = [
        LeadStatus::New,
        LeadStatus::Claimed,
        LeadStatus::Delivered,
        LeadStatus::Expired,
        LeadStatus::Dropped,
        LeadStatus::Failed,
    ];

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        !self.is_pending()
    }

    /// Is this lead still active work (NEW or CLAIMED)?
    pub fn is_pending(self) -> bool {
        matches!(self, LeadStatus::New | LeadStatus::Claimed)
    }

    /// Whether the queue engine is allowed to move a lead from `self` to `next`.
    pub fn can_transition_to(self, next: LeadStatus) -> bool {
        use LeadStatus::*;
        matches!(
            (self, next),
            (New, Claimed)
                | (New, Dropped)
                | (New, Expired)
                | (New, Failed)
                | (Claimed, Delivered)
                | (Claimed, New)
                | (Claimed, Expired)
                | (Claimed, Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "NEW",
            LeadStatus::Claimed => "CLAIMED",
            LeadStatus::Delivered => "DELIVERED",
            LeadStatus::Expired => "EXPIRED",
            LeadStatus::Dropped => "DROPPED",
            LeadStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lead status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for LeadStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LeadStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}
