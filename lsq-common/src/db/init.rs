//! Database initialization
//!
//! Creates the database on first run and brings the schema up to date.
//! All schema statements are idempotent (`CREATE TABLE IF NOT EXISTS`), so
//! initialization is safe to run on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_connection(&pool).await?;
    create_tables(&pool).await?;
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Apply connection-level PRAGMAs
///
/// WAL allows concurrent readers with one writer, which matters here because
/// profile reads (dashboards) run alongside serialized per-lead writes.
async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;
    Ok(())
}

/// Create all tables (idempotent)
///
/// Exposed separately so tests can build an in-memory schema without going
/// through file-based initialization.
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_leads_table(pool).await?;
    create_interactions_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Canonical per-lead profile state
async fn create_leads_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS leads (
            guid TEXT PRIMARY KEY,
            identity_key TEXT NOT NULL UNIQUE,
            name TEXT,
            phone TEXT,
            source TEXT,
            tier TEXT NOT NULL DEFAULT 'visitor',
            sticky INTEGER NOT NULL DEFAULT 0,
            breakdown TEXT NOT NULL DEFAULT '{}',
            metadata TEXT,
            created_at TEXT NOT NULL,
            last_interaction TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Append-only idempotent interaction log
///
/// The composite primary key `(lead_id, event_id)` is what makes
/// `INSERT OR IGNORE` an idempotent append.
async fn create_interactions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interactions (
            lead_id TEXT NOT NULL,
            event_id TEXT NOT NULL,
            category TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            points INTEGER NOT NULL DEFAULT 0,
            payload TEXT,
            PRIMARY KEY (lead_id, event_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_interactions_lead_time
        ON interactions (lead_id, timestamp)
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}
