//! Command definitions and handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use leadq_core::app::{Janitor, JanitorConfig, seed_defaults};
use leadq_core::domain::{LeadId, LeadStatus, TenantId};
use leadq_core::impls::pg::{PgConfig, PgLeadStore, PgTunables, init_schema};
use leadq_core::queue::{LeadQueue, QueueOptions};

#[derive(Parser)]
#[command(name = "leadq")]
#[command(about = "Multi-tenant durable lead queue")]
#[command(version)]
pub struct Cli {
    /// PostgreSQL connection string
    #[arg(long, global = true, env = "LEADQ_DATABASE_URL")]
    database_url: Option<String>,

    /// Connection pool size
    #[arg(long, global = true, env = "LEADQ_MAX_CONNECTIONS", default_value_t = 10)]
    max_connections: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create tables and indexes if missing
    Migrate,

    /// Release stale claims, expire overdue leads, purge old terminal rows
    Janitor {
        /// Tenant to maintain (repeatable; default: "default")
        #[arg(long = "tenant")]
        tenants: Vec<TenantId>,
        /// Purge terminal rows created more than this many days ago
        #[arg(long, default_value_t = 60)]
        purge_older_than_days: i64,
        /// Terminal status to purge (repeatable; default: all terminal)
        #[arg(long = "purge-status")]
        purge_statuses: Vec<LeadStatus>,
        /// Report intended counts without writing
        #[arg(long)]
        dry_run: bool,
        /// Keep running, one cycle every N seconds (default: single pass)
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// Claim leads and print their payloads (consumer stub)
    Consume {
        #[arg(long, default_value = "default")]
        tenant: TenantId,
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
        /// Acknowledge everything that was claimed
        #[arg(long)]
        ack: bool,
        /// Pretty-print payloads
        #[arg(long)]
        pretty: bool,
    },

    /// Enqueue one lead (producer stub)
    Enqueue {
        #[arg(long, default_value = "default")]
        tenant: TenantId,
        /// Payload as a JSON document
        #[arg(long)]
        payload: String,
        /// Override the tenant TTL
        #[arg(long)]
        ttl_days: Option<i64>,
    },

    /// Mark a lead FAILED
    Fail {
        #[arg(long, default_value = "default")]
        tenant: TenantId,
        #[arg(long)]
        lead_id: LeadId,
        #[arg(long)]
        error: String,
        /// Clear the claim token instead of keeping it for diagnostics
        #[arg(long)]
        clear_token: bool,
    },

    /// Write default tunables for a tenant (idempotent)
    SettingsInit {
        #[arg(long, default_value = "default")]
        tenant: TenantId,
        /// Overwrite existing values
        #[arg(long)]
        force: bool,
    },

    /// Show per-status counts and effective tunables
    Status {
        #[arg(long, default_value = "default")]
        tenant: TenantId,
    },

    /// In-memory walkthrough of the lead lifecycle (no database)
    Demo,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Demo => crate::demo::run().await,
        Commands::Migrate => {
            let backend = Backend::connect(&cli.database_url, cli.max_connections).await?;
            init_schema(backend.store.pool()).await?;
            println!("OK: schema ready");
            Ok(())
        }
        Commands::Janitor {
            tenants,
            purge_older_than_days,
            purge_statuses,
            dry_run,
            interval_secs,
        } => {
            let backend = Backend::connect(&cli.database_url, cli.max_connections).await?;
            let mut config = JanitorConfig {
                purge_older_than_days,
                dry_run,
                ..JanitorConfig::default()
            };
            if !tenants.is_empty() {
                config.tenants = tenants;
            }
            if !purge_statuses.is_empty() {
                config.purge_statuses = purge_statuses;
            }
            cmd_janitor(backend.queue(), config, interval_secs).await
        }
        Commands::Consume {
            tenant,
            limit,
            ack,
            pretty,
        } => {
            let backend = Backend::connect(&cli.database_url, cli.max_connections).await?;
            cmd_consume(&backend.queue(), &tenant, limit, ack, pretty).await
        }
        Commands::Enqueue {
            tenant,
            payload,
            ttl_days,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("--payload is not valid JSON")?;
            let backend = Backend::connect(&cli.database_url, cli.max_connections).await?;
            let lead_id = backend.queue().enqueue(&tenant, &payload, ttl_days).await?;
            println!("{lead_id}");
            Ok(())
        }
        Commands::Fail {
            tenant,
            lead_id,
            error,
            clear_token,
        } => {
            let backend = Backend::connect(&cli.database_url, cli.max_connections).await?;
            let n = backend
                .queue()
                .mark_failed(&tenant, lead_id, &error, !clear_token)
                .await?;
            println!("OK: tenant={tenant} lead_id={lead_id} failed={n}");
            Ok(())
        }
        Commands::SettingsInit { tenant, force } => {
            let backend = Backend::connect(&cli.database_url, cli.max_connections).await?;
            let report = seed_defaults(backend.tunables.as_ref(), &tenant, force).await?;
            println!(
                "OK: tenant={tenant} inserted={} updated={} skipped={}",
                report.inserted, report.updated, report.skipped
            );
            Ok(())
        }
        Commands::Status { tenant } => {
            let backend = Backend::connect(&cli.database_url, cli.max_connections).await?;
            let queue = backend.queue();
            let counts = queue.counts(&tenant).await?;
            let config = queue.tenant_config(&tenant).await?;
            let view = json!({
                "tenant": tenant,
                "pending": counts.pending(),
                "counts": counts,
                "config": config,
            });
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(())
        }
    }
}

struct Backend {
    store: Arc<PgLeadStore>,
    tunables: Arc<PgTunables>,
}

impl Backend {
    async fn connect(database_url: &Option<String>, max_connections: u32) -> anyhow::Result<Self> {
        let Some(url) = database_url else {
            bail!("no database configured: pass --database-url or set LEADQ_DATABASE_URL");
        };
        let pool = PgConfig::new(url.as_str())
            .with_max_connections(max_connections)
            .connect()
            .await
            .context("connecting to PostgreSQL")?;
        Ok(Self {
            store: Arc::new(PgLeadStore::new(pool.clone())),
            tunables: Arc::new(PgTunables::new(pool)),
        })
    }

    fn queue(&self) -> LeadQueue {
        LeadQueue::new(
            self.store.clone(),
            self.tunables.clone(),
            QueueOptions::default(),
        )
    }
}

async fn cmd_consume(
    queue: &LeadQueue,
    tenant: &TenantId,
    limit: u32,
    ack: bool,
    pretty: bool,
) -> anyhow::Result<()> {
    let claim = queue.claim(tenant, limit).await?;
    for lead in &claim.leads {
        let line = json!({
            "lead_id": lead.lead_id,
            "created_at": lead.created_at,
            "expires_at": lead.expires_at,
            "payload": lead.payload,
        });
        if pretty {
            println!("{}", serde_json::to_string_pretty(&line)?);
        } else {
            println!("{line}");
        }
    }

    let acked = if ack && !claim.is_empty() {
        queue.ack(tenant, claim.token, &claim.lead_ids()).await?
    } else {
        0
    };
    eprintln!(
        "OK: tenant={tenant} claim_token={} claimed={} acked={acked}",
        claim.token,
        claim.len()
    );
    Ok(())
}

async fn cmd_janitor(
    queue: LeadQueue,
    config: JanitorConfig,
    interval_secs: Option<u64>,
) -> anyhow::Result<()> {
    let queue = Arc::new(queue);

    match interval_secs {
        Some(secs) if secs > 0 => {
            let config = JanitorConfig {
                interval: Duration::from_secs(secs),
                ..config
            };
            let handle = Janitor::new(queue, config).spawn();
            tokio::signal::ctrl_c()
                .await
                .context("waiting for Ctrl-C")?;
            info!("shutdown requested");
            handle.shutdown_and_join().await;
            Ok(())
        }
        _ => {
            let report = Janitor::new(queue, config).run_once().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                bail!("janitor failed for {} tenant(s)", report.failures.len());
            }
            Ok(())
        }
    }
}
