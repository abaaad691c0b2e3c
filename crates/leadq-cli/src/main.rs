//! leadq - operator CLI for the lead queue.
//!
//! Database-backed commands read `--database-url` / `LEADQ_DATABASE_URL`.
//! `leadq demo` runs entirely in memory.

mod cli;
mod demo;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so RUST_LOG and LEADQ_* from it are visible below
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "leadq=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    cli::run().await
}
