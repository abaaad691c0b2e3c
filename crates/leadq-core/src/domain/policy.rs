//! Per-tenant queue policy: tunable keys, their bounds, and the resolved config.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical tunable keys (do not rename casually: they are stored per tenant).
pub mod keys {
    pub const TTL_DAYS: &str = "leads.ttl_days";
    pub const MAX_PENDING: &str = "leads.max_pending";
    pub const CLAIM_TIMEOUT_MINUTES: &str = "leads.claim_timeout_minutes";
    pub const OVERFLOW_POLICY: &str = "leads.overflow_policy";
}

/// Inclusive integer range a tunable must stay within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: i64,
    pub max: i64,
}

impl Bounds {
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn clamp(self, value: i64) -> i64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

pub const TTL_DAYS_BOUNDS: Bounds = Bounds::new(1, 90);
pub const MAX_PENDING_BOUNDS: Bounds = Bounds::new(100, 2_000_000);
pub const CLAIM_TIMEOUT_MINUTES_BOUNDS: Bounds = Bounds::new(1, 1440);

/// Bounds the engine clamps tunables into.
///
/// The defaults are the documented production ranges. Small deployments and
/// tests may lower the `max_pending` floor through `QueueOptions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunableBounds {
    pub ttl_days: Bounds,
    pub max_pending: Bounds,
    pub claim_timeout_minutes: Bounds,
}

impl Default for TunableBounds {
    fn default() -> Self {
        Self {
            ttl_days: TTL_DAYS_BOUNDS,
            max_pending: MAX_PENDING_BOUNDS,
            claim_timeout_minutes: CLAIM_TIMEOUT_MINUTES_BOUNDS,
        }
    }
}

pub const DEFAULT_TTL_DAYS: i64 = 14;
pub const DEFAULT_MAX_PENDING: i64 = 50_000;
pub const DEFAULT_CLAIM_TIMEOUT_MINUTES: i64 = 30;

/// Backpressure strategy when pending reaches `max_pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverflowPolicy {
    /// Evict the oldest unclaimed (NEW) leads to make room.
    #[default]
    DropOldestNew,
    /// Refuse the new lead with `QueueFull`.
    Reject,
}

impl OverflowPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            OverflowPolicy::DropOldestNew => "DROP_OLDEST_NEW",
            OverflowPolicy::Reject => "REJECT",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown overflow policy: {0}")]
pub struct UnknownPolicy(pub String);

impl FromStr for OverflowPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DROP_OLDEST_NEW" => Ok(OverflowPolicy::DropOldestNew),
            "REJECT" => Ok(OverflowPolicy::Reject),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

/// Effective queue settings for one tenant, as read at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantQueueConfig {
    pub ttl_days: i64,
    pub max_pending: i64,
    pub claim_timeout_minutes: i64,
    pub overflow_policy: OverflowPolicy,
}

impl Default for TenantQueueConfig {
    fn default() -> Self {
        Self {
            ttl_days: DEFAULT_TTL_DAYS,
            max_pending: DEFAULT_MAX_PENDING,
            claim_timeout_minutes: DEFAULT_CLAIM_TIMEOUT_MINUTES,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

/// Default values keyed by tunable name, as stored by `settings-init`.
pub fn default_tunables() -> Vec<(&'static str, serde_json::Value)> {
    let defaults = TenantQueueConfig::default();
    vec![
        (keys::TTL_DAYS, serde_json::json!(defaults.ttl_days)),
        (keys::MAX_PENDING, serde_json::json!(defaults.max_pending)),
        (
            keys::CLAIM_TIMEOUT_MINUTES,
            serde_json::json!(defaults.claim_timeout_minutes),
        ),
        (
            keys::OVERFLOW_POLICY,
            serde_json::json!(defaults.overflow_policy.as_str()),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::below(TTL_DAYS_BOUNDS, 0, 1)]
    #[case::above(TTL_DAYS_BOUNDS, 365, 90)]
    #[case::inside(TTL_DAYS_BOUNDS, 7, 7)]
    #[case::pending_floor(MAX_PENDING_BOUNDS, 1, 100)]
    #[case::pending_ceiling(MAX_PENDING_BOUNDS, 10_000_000, 2_000_000)]
    #[case::timeout_negative(CLAIM_TIMEOUT_MINUTES_BOUNDS, -5, 1)]
    fn clamps_into_bounds(#[case] bounds: Bounds, #[case] raw: i64, #[case] expected: i64) {
        assert_eq!(bounds.clamp(raw), expected);
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = TenantQueueConfig::default();
        assert_eq!(config.ttl_days, 14);
        assert_eq!(config.max_pending, 50_000);
        assert_eq!(config.claim_timeout_minutes, 30);
        assert_eq!(config.overflow_policy, OverflowPolicy::DropOldestNew);
    }

    #[test]
    fn policy_parsing_is_case_insensitive() {
        assert_eq!(
            "reject".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::Reject
        );
        assert_eq!(
            " DROP_OLDEST_NEW ".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::DropOldestNew
        );
        assert!("DROP_NEWEST".parse::<OverflowPolicy>().is_err());
    }

    #[test]
    fn default_tunables_cover_every_key() {
        let names: Vec<_> = default_tunables().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            names,
            vec![
                keys::TTL_DAYS,
                keys::MAX_PENDING,
                keys::CLAIM_TIMEOUT_MINUTES,
                keys::OVERFLOW_POLICY
            ]
        );
    }
}
