//! Lead record: one row per queued item.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::QueueError;
use super::ids::{ClaimToken, LeadId};
use super::status::LeadStatus;

/// `last_error` written on leads evicted by the overflow guard.
pub const OVERFLOW_DROP_REASON: &str = "overflow_drop_oldest_new";

const MAX_TENANT_LEN: usize = 64;

/// Tenant identifier: the isolation boundary for queue state and tunables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn new(value: impl Into<String>) -> Result<Self, QueueError> {
        let value = value.into();
        if value.is_empty() {
            return Err(QueueError::validation("tenant_id must not be empty"));
        }
        if value.len() > MAX_TENANT_LEN {
            return Err(QueueError::validation(format!(
                "tenant_id longer than {MAX_TENANT_LEN} bytes"
            )));
        }
        if value.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(QueueError::validation(
                "tenant_id must not contain whitespace or control characters",
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TenantId::new(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = QueueError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TenantId::new(value)
    }
}

impl From<TenantId> for String {
    fn from(tenant: TenantId) -> Self {
        tenant.0
    }
}

/// A state change applied by the store's conditional update.
///
/// The engine decides *which* rows (via `LeadFilter`); the transition decides
/// *what* is written. Every variant has exactly one target status.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// NEW -> CLAIMED under a fresh claim token.
    Claim {
        token: ClaimToken,
        at: DateTime<Utc>,
    },
    /// CLAIMED -> DELIVERED.
    Deliver { at: DateTime<Utc> },
    /// CLAIMED -> NEW, lease cleared.
    Release,
    /// NEW | CLAIMED -> EXPIRED.
    Expire,
    /// NEW -> DROPPED with a reason in `last_error`.
    Drop { reason: String },
    /// NEW | CLAIMED -> FAILED, attempts + 1.
    Fail {
        error: String,
        keep_claim_token: bool,
    },
}

impl Transition {
    pub fn target(&self) -> LeadStatus {
        match self {
            Transition::Claim { .. } => LeadStatus::Claimed,
            Transition::Deliver { .. } => LeadStatus::Delivered,
            Transition::Release => LeadStatus::New,
            Transition::Expire => LeadStatus::Expired,
            Transition::Drop { .. } => LeadStatus::Dropped,
            Transition::Fail { .. } => LeadStatus::Failed,
        }
    }
}

/// Metadata + payload for a lead in the queue.
///
/// - This is the single source of truth for lead state.
/// - All state transitions happen through `apply`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub lead_id: LeadId,
    pub tenant_id: TenantId,
    pub status: LeadStatus,

    /// Producer-defined document, never interpreted by the engine.
    pub payload: serde_json::Value,

    pub created_at: DateTime<Utc>,

    /// `created_at + ttl` at creation time. Never recomputed.
    pub expires_at: DateTime<Utc>,

    pub claim_token: Option<ClaimToken>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,

    /// Number of `mark_failed` calls.
    pub attempts: u32,

    pub last_error: Option<String>,
}

impl Lead {
    pub fn new(
        lead_id: LeadId,
        tenant_id: TenantId,
        payload: serde_json::Value,
        created_at: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            lead_id,
            tenant_id,
            status: LeadStatus::New,
            payload,
            created_at,
            expires_at: created_at + ttl,
            claim_token: None,
            claimed_at: None,
            delivered_at: None,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Apply a transition if the state machine allows it.
    ///
    /// Returns `false` (and leaves the record untouched) for a forbidden edge.
    pub fn apply(&mut self, transition: &Transition) -> bool {
        if !self.status.can_transition_to(transition.target()) {
            return false;
        }
        match transition {
            Transition::Claim { token, at } => {
                self.claim_token = Some(*token);
                self.claimed_at = Some(*at);
            }
            Transition::Deliver { at } => {
                self.delivered_at = Some(*at);
                self.claim_token = None;
            }
            Transition::Release => {
                self.claim_token = None;
                self.claimed_at = None;
            }
            Transition::Expire => {
                self.claim_token = None;
            }
            Transition::Drop { reason } => {
                self.claim_token = None;
                self.last_error = Some(reason.clone());
            }
            Transition::Fail {
                error,
                keep_claim_token,
            } => {
                self.attempts += 1;
                self.last_error = Some(error.clone());
                if !keep_claim_token {
                    self.claim_token = None;
                }
            }
        }
        self.status = transition.target();
        true
    }
}

/// The consumer's view of a claimed lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimedLead {
    pub lead_id: LeadId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl From<Lead> for ClaimedLead {
    fn from(lead: Lead) -> Self {
        Self {
            lead_id: lead.lead_id,
            created_at: lead.created_at,
            expires_at: lead.expires_at,
            payload: lead.payload,
        }
    }
}

/// Result of one `claim` call: the token plus the leads leased under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub token: ClaimToken,
    pub leads: Vec<ClaimedLead>,
}

impl Claim {
    pub fn lead_ids(&self) -> Vec<LeadId> {
        self.leads.iter().map(|lead| lead.lead_id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }
}
