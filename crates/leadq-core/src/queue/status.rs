use serde::{Deserialize, Serialize};

use crate::domain::LeadStatus;

/// Per-status row counts for one tenant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub new: u64,
    pub claimed: u64,
    pub delivered: u64,
    pub expired: u64,
    pub dropped: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn get(&self, status: LeadStatus) -> u64 {
        match status {
            LeadStatus::New => self.new,
            LeadStatus::Claimed => self.claimed,
            LeadStatus::Delivered => self.delivered,
            LeadStatus::Expired => self.expired,
            LeadStatus::Dropped => self.dropped,
            LeadStatus::Failed => self.failed,
        }
    }

    pub(crate) fn set(&mut self, status: LeadStatus, count: u64) {
        let slot = match status {
            LeadStatus::New => &mut self.new,
            LeadStatus::Claimed => &mut self.claimed,
            LeadStatus::Delivered => &mut self.delivered,
            LeadStatus::Expired => &mut self.expired,
            LeadStatus::Dropped => &mut self.dropped,
            LeadStatus::Failed => &mut self.failed,
        };
        *slot = count;
    }

    /// NEW + CLAIMED, the number the overflow guard compares to `max_pending`.
    pub fn pending(&self) -> u64 {
        self.new + self.claimed
    }

    pub fn total(&self) -> u64 {
        LeadStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }
}
