//! End-to-end lifecycle scenarios against the in-memory store on a fixed clock.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use serde_json::json;

use leadq_core::domain::{
    ErrorKind, LeadId, LeadStatus, OVERFLOW_DROP_REASON, QueueError, TenantId, keys,
};
use leadq_core::impls::{InMemoryLeadStore, InMemoryTunables};
use leadq_core::ports::FixedClock;
use leadq_core::queue::{LeadQueue, QueueOptions};

struct Harness {
    queue: LeadQueue,
    store: InMemoryLeadStore,
    tunables: Arc<InMemoryTunables>,
    clock: Arc<FixedClock>,
    tenant: TenantId,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        ));
        let store = InMemoryLeadStore::new().with_clock(clock.clone());
        let tunables = Arc::new(InMemoryTunables::new());
        let queue = LeadQueue::new(
            Arc::new(store.clone()),
            tunables.clone(),
            QueueOptions::default().with_max_pending_floor(1),
        );
        Self {
            queue,
            store,
            tunables,
            clock,
            tenant: TenantId::new("default").unwrap(),
        }
    }

    /// Enqueue `n` leads one second apart so FIFO order is unambiguous.
    async fn enqueue_n(&self, n: usize, ttl_days: Option<i64>) -> Vec<LeadId> {
        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            let id = self
                .queue
                .enqueue(&self.tenant, &json!({ "n": i }), ttl_days)
                .await
                .unwrap();
            ids.push(id);
            self.clock.advance(Duration::seconds(1));
        }
        ids
    }

    async fn status_of(&self, id: LeadId) -> LeadStatus {
        self.store.get(&self.tenant, id).await.unwrap().status
    }
}

#[tokio::test]
async fn claim_returns_the_oldest_leads_first() {
    let h = Harness::new();
    let ids = h.enqueue_n(3, Some(7)).await;

    let claim = h.queue.claim(&h.tenant, 2).await.unwrap();
    assert_eq!(claim.lead_ids(), ids[..2].to_vec());

    let counts = h.queue.counts(&h.tenant).await.unwrap();
    assert_eq!(counts.new, 1);
    assert_eq!(counts.claimed, 2);
    assert_eq!(counts.pending(), 3);
}

#[tokio::test]
async fn overflow_drops_the_oldest_new_lead() {
    let h = Harness::new();
    h.tunables.set(&h.tenant, keys::MAX_PENDING, json!(2)).await;
    h.tunables
        .set(&h.tenant, keys::OVERFLOW_POLICY, json!("DROP_OLDEST_NEW"))
        .await;
    let ids = h.enqueue_n(2, None).await;

    let third = h
        .queue
        .enqueue(&h.tenant, &json!({"n": 2}), None)
        .await
        .unwrap();

    let oldest = h.store.get(&h.tenant, ids[0]).await.unwrap();
    assert_eq!(oldest.status, LeadStatus::Dropped);
    assert_eq!(oldest.last_error.as_deref(), Some(OVERFLOW_DROP_REASON));
    assert_eq!(h.status_of(ids[1]).await, LeadStatus::New);
    assert_eq!(h.status_of(third).await, LeadStatus::New);
    assert_eq!(h.queue.counts(&h.tenant).await.unwrap().pending(), 2);
}

#[tokio::test]
async fn stale_claims_are_released_and_reclaimable() {
    let h = Harness::new();
    h.tunables
        .set(&h.tenant, keys::CLAIM_TIMEOUT_MINUTES, json!(1))
        .await;
    let ids = h.enqueue_n(1, None).await;
    let first = h.queue.claim(&h.tenant, 1).await.unwrap();
    let before = h.store.get(&h.tenant, ids[0]).await.unwrap();

    // not stale yet
    assert_eq!(h.queue.release_stale_claims(&h.tenant, None).await.unwrap(), 0);

    h.clock.advance(Duration::minutes(2));
    assert_eq!(h.queue.release_stale_claims(&h.tenant, None).await.unwrap(), 1);

    let lead = h.store.get(&h.tenant, ids[0]).await.unwrap();
    assert_eq!(lead.status, LeadStatus::New);
    assert_eq!(lead.claim_token, None);
    assert_eq!(lead.claimed_at, None);
    assert_eq!(lead.expires_at, before.expires_at);

    let second = h.queue.claim(&h.tenant, 1).await.unwrap();
    assert_eq!(second.lead_ids(), ids);
    assert_ne!(second.token, first.token);

    // the crashed consumer's token is dead
    assert_eq!(
        h.queue.ack(&h.tenant, first.token, &ids).await.unwrap(),
        0
    );
    assert_eq!(h.status_of(ids[0]).await, LeadStatus::Claimed);
}

#[tokio::test]
async fn expired_leads_are_never_claimed() {
    let h = Harness::new();
    let ids = h.enqueue_n(1, Some(1)).await;

    h.clock.advance(Duration::days(1));
    // past expires_at but not yet swept: claim must still skip it
    assert!(h.queue.claim(&h.tenant, 10).await.unwrap().is_empty());

    assert_eq!(h.queue.expire_overdue(&h.tenant).await.unwrap(), 1);
    assert_eq!(h.status_of(ids[0]).await, LeadStatus::Expired);
    assert!(h.queue.claim(&h.tenant, 10).await.unwrap().is_empty());
    assert_eq!(h.queue.expire_overdue(&h.tenant).await.unwrap(), 0);
}

#[tokio::test]
async fn reject_policy_refuses_when_full() {
    let h = Harness::new();
    h.tunables.set(&h.tenant, keys::MAX_PENDING, json!(1)).await;
    h.tunables
        .set(&h.tenant, keys::OVERFLOW_POLICY, json!("REJECT"))
        .await;
    h.enqueue_n(1, None).await;
    h.queue.claim(&h.tenant, 1).await.unwrap();

    let err = h
        .queue
        .enqueue(&h.tenant, &json!({"n": 1}), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueueFull);
    assert!(matches!(
        err,
        QueueError::QueueFull {
            pending: 1,
            max_pending: 1,
            ..
        }
    ));
    assert_eq!(h.store.snapshot(&h.tenant).await.len(), 1);
}

#[tokio::test]
async fn drop_policy_refuses_when_everything_is_claimed() {
    let h = Harness::new();
    h.tunables.set(&h.tenant, keys::MAX_PENDING, json!(2)).await;
    h.enqueue_n(2, None).await;
    h.queue.claim(&h.tenant, 2).await.unwrap();

    let err = h
        .queue
        .enqueue(&h.tenant, &json!({"n": 2}), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::QueueFull);

    let counts = h.queue.counts(&h.tenant).await.unwrap();
    assert_eq!(counts.claimed, 2);
    assert_eq!(counts.dropped, 0);
    assert_eq!(counts.total(), 2);
}

#[tokio::test]
async fn ack_is_idempotent_and_token_bound() {
    let h = Harness::new();
    h.enqueue_n(2, None).await;
    let claim = h.queue.claim(&h.tenant, 2).await.unwrap();

    assert_eq!(
        h.queue
            .ack(&h.tenant, claim.token, &claim.lead_ids())
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        h.queue
            .ack(&h.tenant, claim.token, &claim.lead_ids())
            .await
            .unwrap(),
        0
    );

    for lead in h.store.snapshot(&h.tenant).await {
        assert_eq!(lead.status, LeadStatus::Delivered);
        assert_eq!(lead.claim_token, None);
        assert!(lead.delivered_at.is_some());
    }
}

#[tokio::test]
async fn mismatched_token_never_transitions() {
    let h = Harness::new();
    let ids = h.enqueue_n(2, None).await;
    let a = h.queue.claim(&h.tenant, 1).await.unwrap();
    let b = h.queue.claim(&h.tenant, 1).await.unwrap();

    // each token only covers its own lead
    assert_eq!(h.queue.ack(&h.tenant, a.token, &ids).await.unwrap(), 1);
    assert_eq!(h.status_of(ids[1]).await, LeadStatus::Claimed);
    assert_eq!(h.queue.ack(&h.tenant, b.token, &ids).await.unwrap(), 1);

    // unknown ids are skipped, not errors
    let stranger = LeadId::from(uuid::Uuid::from_u128(42));
    assert_eq!(h.queue.ack(&h.tenant, b.token, &[stranger]).await.unwrap(), 0);
}

#[tokio::test]
async fn expires_at_is_fixed_at_enqueue() {
    let h = Harness::new();
    h.tunables.set(&h.tenant, keys::TTL_DAYS, json!(3)).await;
    let ids = h.enqueue_n(1, None).await;
    let original = h.store.get(&h.tenant, ids[0]).await.unwrap();
    assert_eq!(original.expires_at - original.created_at, Duration::days(3));

    // changing the tunable later does not move existing deadlines
    h.tunables.set(&h.tenant, keys::TTL_DAYS, json!(30)).await;
    let claim = h.queue.claim(&h.tenant, 1).await.unwrap();
    h.clock.advance(Duration::hours(1));
    h.queue.release_stale_claims(&h.tenant, Some(30)).await.unwrap();
    h.queue.claim(&h.tenant, 1).await.unwrap();
    h.queue.ack(&h.tenant, claim.token, &ids).await.unwrap();

    let lead = h.store.get(&h.tenant, ids[0]).await.unwrap();
    assert_eq!(lead.expires_at, original.expires_at);
    assert_eq!(lead.created_at, original.created_at);
}

#[tokio::test]
async fn purge_keeps_active_rows_however_old() {
    let h = Harness::new();
    let ids = h.enqueue_n(3, Some(90)).await;
    let claim = h.queue.claim(&h.tenant, 2).await.unwrap();
    h.queue
        .ack(&h.tenant, claim.token, &ids[..1])
        .await
        .unwrap();

    h.clock.advance(Duration::days(80));
    let purged = h
        .queue
        .purge_old(&h.tenant, 1, &LeadStatus::TERMINAL)
        .await
        .unwrap();
    assert_eq!(purged, 1);

    assert_eq!(h.status_of(ids[1]).await, LeadStatus::Claimed);
    assert_eq!(h.status_of(ids[2]).await, LeadStatus::New);
}

#[tokio::test]
async fn tenants_do_not_see_each_other() {
    let h = Harness::new();
    let other = TenantId::new("other").unwrap();
    h.tunables.set(&other, keys::MAX_PENDING, json!(1)).await;
    h.tunables.set(&other, keys::OVERFLOW_POLICY, json!("REJECT")).await;

    h.enqueue_n(2, None).await;
    h.queue.enqueue(&other, &json!({}), None).await.unwrap();

    // the other tenant's cap is its own
    assert!(h.queue.enqueue(&other, &json!({}), None).await.is_err());
    h.enqueue_n(1, None).await;

    assert_eq!(h.queue.claim(&other, 10).await.unwrap().len(), 1);
    assert_eq!(h.queue.claim(&h.tenant, 10).await.unwrap().len(), 3);
}
