//! Overflow guard - enqueue 前の backpressure 判定
//!
//! enqueue と同じ unit of work の中で実行されます。
//! `lock_tenant` で同一 tenant の producer を直列化するので、
//! 並行 enqueue が同時に「まだ空きがある」と判断して上限を超えることはありません。

use tracing::{info, warn};

use crate::domain::{
    LeadStatus, OVERFLOW_DROP_REASON, OverflowPolicy, QueueError, TenantId, Transition,
};
use crate::ports::{LeadFilter, LeadTx};

/// Outcome of a guard run that allowed the insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Admission {
    /// Pending count observed before any drop.
    pub pending: u64,
    /// NEW leads moved to DROPPED to make room.
    pub dropped: u64,
}

pub(crate) async fn admit(
    tx: &mut dyn LeadTx,
    tenant: &TenantId,
    max_pending: u64,
    policy: OverflowPolicy,
) -> Result<Admission, QueueError> {
    tx.lock_tenant(tenant).await?;

    let pending = tx
        .count(tenant, &LeadFilter::new().statuses(&LeadStatus::PENDING))
        .await?;
    if pending < max_pending {
        return Ok(Admission {
            pending,
            dropped: 0,
        });
    }

    let full = || QueueError::QueueFull {
        tenant: tenant.to_string(),
        pending,
        max_pending,
    };

    if policy == OverflowPolicy::Reject {
        warn!(%tenant, pending, max_pending, "queue full; rejecting enqueue");
        return Err(full());
    }

    let excess = pending - max_pending + 1;
    let new_only = LeadFilter::new().status(LeadStatus::New);
    let victims = tx
        .lease(tenant, &new_only, u32::try_from(excess).unwrap_or(u32::MAX))
        .await?;
    if victims.is_empty() {
        // Everything pending is CLAIMED: consumers are stuck, keep their work.
        warn!(
            %tenant,
            pending,
            max_pending,
            "queue full and no NEW lead to drop; rejecting enqueue"
        );
        return Err(full());
    }

    // victims are locked by this unit and still NEW, so all of them move
    let dropped = tx
        .update(
            tenant,
            &new_only.ids(&victims),
            &Transition::Drop {
                reason: OVERFLOW_DROP_REASON.to_string(),
            },
        )
        .await?;

    info!(%tenant, pending, max_pending, dropped, "dropped oldest NEW leads on overflow");
    Ok(Admission { pending, dropped })
}
