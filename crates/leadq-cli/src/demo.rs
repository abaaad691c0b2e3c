//! In-memory walkthrough: producer → consumer → janitor, on a fake clock.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use leadq_core::app::{Janitor, JanitorConfig};
use leadq_core::domain::{TenantId, keys};
use leadq_core::impls::{InMemoryLeadStore, InMemoryTunables};
use leadq_core::ports::FixedClock;
use leadq_core::queue::{LeadQueue, QueueOptions};

pub async fn run() -> anyhow::Result<()> {
    let tenant = TenantId::new("demo")?;

    // (A) store / tunables / clock を用意
    let clock = Arc::new(FixedClock::new(Utc::now()));
    let store = InMemoryLeadStore::new().with_clock(clock.clone());
    let tunables = Arc::new(InMemoryTunables::new());
    tunables.set(&tenant, keys::MAX_PENDING, json!(3)).await;
    tunables.set(&tenant, keys::CLAIM_TIMEOUT_MINUTES, json!(5)).await;

    let queue = Arc::new(LeadQueue::new(
        Arc::new(store.clone()),
        tunables,
        QueueOptions::default().with_max_pending_floor(1),
    ));

    // (B) producer: 4 件入れる（max_pending=3 なので最古の NEW が 1 件 DROPPED）
    for (i, title) in ["studio", "1LDK", "2LDK", "house"].iter().enumerate() {
        let ttl = if i == 3 { Some(1) } else { None };
        let id = queue
            .enqueue(&tenant, &json!({ "title": title }), ttl)
            .await?;
        println!("enqueued: {id} title={title}");
        clock.advance(Duration::seconds(1));
    }
    println!("counts: {:?}", queue.counts(&tenant).await?);

    // (C) consumer: 2 件 claim して 1 件 ack、もう 1 件は放置（クラッシュ想定）
    let claim = queue.claim(&tenant, 2).await?;
    println!("claimed: token={} leads={}", claim.token, claim.len());
    let first: Vec<_> = claim.lead_ids().into_iter().take(1).collect();
    let acked = queue.ack(&tenant, claim.token, &first).await?;
    println!("acked: {acked}");

    // 同じ token で二度目の ack は 0 件
    let again = queue.ack(&tenant, claim.token, &first).await?;
    println!("acked again: {again}");

    // (D) 時間を進めて janitor を 1 周（stale claim を戻し、TTL 1 日の lead を期限切れに）
    clock.advance(Duration::days(2));
    let janitor = Janitor::new(
        queue.clone(),
        JanitorConfig {
            tenants: vec![tenant.clone()],
            ..JanitorConfig::default()
        },
    );
    let report = janitor.run_once().await;
    println!(
        "janitor: released={} expired={} purged={}",
        report.total_released(),
        report.total_expired(),
        report.total_purged()
    );

    // (E) 最終状態
    for lead in store.snapshot(&tenant).await {
        println!(
            "final: {} status={} attempts={} last_error={:?}",
            lead.lead_id, lead.status, lead.attempts, lead.last_error
        );
    }
    let counts = queue.counts(&tenant).await?;
    println!(
        "counts: new={} delivered={} expired={} dropped={} pending={}",
        counts.new,
        counts.delivered,
        counts.expired,
        counts.dropped,
        counts.pending()
    );
    Ok(())
}
