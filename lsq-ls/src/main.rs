//! Lead Scoring service (lsq-ls) - Main entry point
//!
//! Converts raw interaction events into per-lead engagement scores and
//! qualification tiers, with an idempotent event log and per-lead serialized
//! mutation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lsq_ls::api::{self, AppContext};
use lsq_ls::notify::NotificationDispatcher;
use lsq_ls::state::SharedState;
use lsq_ls::store::ProfileStore;

/// Command-line arguments for lsq-ls
#[derive(Parser, Debug)]
#[command(name = "lsq-ls")]
#[command(about = "Lead scoring and qualification service for LSQ")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5760", env = "LSQ_LS_PORT")]
    port: u16,

    /// Data folder holding the database (resolved via config when omitted)
    #[arg(short, long, env = "LSQ_DATA_FOLDER")]
    data_folder: Option<PathBuf>,

    /// Tier-change notification callback URL (dispatch disabled when omitted)
    #[arg(long, env = "LSQ_NOTIFY_URL")]
    notify_url: Option<String>,

    /// Per-lead lock acquisition timeout in seconds
    #[arg(long, default_value = "5", env = "LSQ_LOCK_TIMEOUT_SECS")]
    lock_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lsq_ls=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse command-line arguments
    let args = Args::parse();

    let data_folder = lsq_common::config::resolve_data_folder(
        args.data_folder.as_deref().and_then(|p| p.to_str()),
        "LSQ_DATA_FOLDER",
    )
    .context("Failed to resolve data folder")?;
    let db_path = data_folder.join("lsq.db");

    info!("Starting LSQ Lead Scoring service on port {}", args.port);
    info!("Database: {}", db_path.display());

    // Initialize database
    let db_pool = lsq_common::db::init_database(&db_path)
        .await
        .context("Failed to initialize database")?;

    // Shared state and event bus
    let state = Arc::new(SharedState::new());

    // Notification dispatcher (fire-and-forget, outside the transaction)
    if args.notify_url.is_none() {
        info!("No notification URL configured; tier-change dispatch disabled");
    }
    let dispatcher = Arc::new(NotificationDispatcher::new(args.notify_url));

    // Profile store with per-lead serialized mutation
    let store = Arc::new(ProfileStore::new(
        db_pool.clone(),
        state.event_bus.clone(),
        dispatcher,
        Duration::from_secs(args.lock_timeout_secs),
    ));

    let ctx = AppContext {
        store,
        state,
        db_pool,
    };

    api::server::run(args.port, ctx)
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}
