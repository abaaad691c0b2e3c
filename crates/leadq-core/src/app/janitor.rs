//! Janitor - 定期メンテナンス
//!
//! # フロー（tenant ごと）
//! 1. release_stale_claims（落ちた consumer の lead を NEW に戻す）
//! 2. expire_overdue（TTL 切れを EXPIRED へ）
//! 3. purge_old（古い終端状態の行を削除）
//!
//! 順序は固定です。同じ周回で NEW に戻った lead も、次の expire で
//! 変わらない `expires_at` に対して評価されます。
//!
//! traffic と並行して走らせても、必要以上に頻繁に走らせても安全です。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::domain::{LeadStatus, QueueError, TenantId};
use crate::queue::LeadQueue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JanitorConfig {
    pub tenants: Vec<TenantId>,

    /// Pause between cycles when spawned.
    pub interval: Duration,

    pub purge_older_than_days: i64,

    /// Terminal statuses eligible for purge.
    pub purge_statuses: Vec<LeadStatus>,

    /// Report what would change without writing.
    pub dry_run: bool,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            tenants: TenantId::new("default").into_iter().collect(),
            interval: Duration::from_secs(60),
            purge_older_than_days: 60,
            purge_statuses: LeadStatus::TERMINAL.to_vec(),
            dry_run: false,
        }
    }
}

/// Counts for one tenant in one cycle (intended counts when `dry_run`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantReport {
    pub tenant: TenantId,
    pub released: u64,
    pub expired: u64,
    pub purged: u64,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantFailure {
    pub tenant: TenantId,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JanitorReport {
    pub tenants: Vec<TenantReport>,
    pub failures: Vec<TenantFailure>,
}

impl JanitorReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total_released(&self) -> u64 {
        self.tenants.iter().map(|t| t.released).sum()
    }

    pub fn total_expired(&self) -> u64 {
        self.tenants.iter().map(|t| t.expired).sum()
    }

    pub fn total_purged(&self) -> u64 {
        self.tenants.iter().map(|t| t.purged).sum()
    }
}

pub struct Janitor {
    queue: Arc<LeadQueue>,
    config: JanitorConfig,
}

impl Janitor {
    pub fn new(queue: Arc<LeadQueue>, config: JanitorConfig) -> Self {
        Self { queue, config }
    }

    pub fn config(&self) -> &JanitorConfig {
        &self.config
    }

    /// One maintenance pass over a single tenant.
    pub async fn run_tenant(&self, tenant: &TenantId) -> Result<TenantReport, QueueError> {
        let days = self.config.purge_older_than_days;
        let statuses = &self.config.purge_statuses;

        let report = if self.config.dry_run {
            TenantReport {
                tenant: tenant.clone(),
                released: self.queue.count_stale_claims(tenant, None).await?,
                expired: self.queue.count_overdue(tenant).await?,
                purged: self.queue.count_purgeable(tenant, days, statuses).await?,
                dry_run: true,
            }
        } else {
            let released = self.queue.release_stale_claims(tenant, None).await?;
            let expired = self.queue.expire_overdue(tenant).await?;
            let purged = self.queue.purge_old(tenant, days, statuses).await?;
            TenantReport {
                tenant: tenant.clone(),
                released,
                expired,
                purged,
                dry_run: false,
            }
        };

        debug!(
            tenant = %report.tenant,
            released = report.released,
            expired = report.expired,
            purged = report.purged,
            dry_run = report.dry_run,
            "janitor pass finished"
        );
        Ok(report)
    }

    /// Every configured tenant once. A failing tenant does not stop the others.
    pub async fn run_once(&self) -> JanitorReport {
        let mut report = JanitorReport::default();
        for tenant in &self.config.tenants {
            match self.run_tenant(tenant).await {
                Ok(tenant_report) => report.tenants.push(tenant_report),
                Err(err) => {
                    error!(%tenant, error = %err, "janitor pass failed");
                    report.failures.push(TenantFailure {
                        tenant: tenant.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Run `run_once` every `interval` until the handle asks to stop.
    pub fn spawn(self) -> JanitorHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(janitor_loop(self, shutdown_rx));
        JanitorHandle { shutdown_tx, join }
    }
}

/// Handle to a spawned janitor loop.
/// - `request_shutdown` stops it after the current cycle
/// - dropping the handle also stops it
pub struct JanitorHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl JanitorHandle {
    pub fn request_shutdown(&self) {
        // the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

async fn janitor_loop(janitor: Janitor, mut shutdown_rx: watch::Receiver<bool>) {
    let period = janitor.config.interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        tenants = janitor.config.tenants.len(),
        interval_ms = period.as_millis() as u64,
        dry_run = janitor.config.dry_run,
        "janitor started"
    );

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let report = janitor.run_once().await;
        info!(
            released = report.total_released(),
            expired = report.total_expired(),
            purged = report.total_purged(),
            failed_tenants = report.failures.len(),
            dry_run = janitor.config.dry_run,
            "janitor cycle"
        );
    }

    info!("janitor stopped");
}
