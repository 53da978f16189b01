//! Database initialization
//!
//! Creates the database on first run with the default schema. Safe to call
//! on every startup; all statements are idempotent.

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
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_connection(&pool).await?;
    create_songs_table(&pool).await?;

    Ok(pool)
}

/// Connection pragmas: WAL for concurrent readers during status writes,
/// bounded busy timeout so contention surfaces as an error we can classify.
async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(pool).await?;
    Ok(())
}

/// Create the `songs` table holding one row per generation job.
///
/// `variants` embeds the variant snapshots as a JSON array; variants are
/// never independently persisted.
pub async fn create_songs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            provider_task_id TEXT,
            status TEXT NOT NULL DEFAULT 'PENDING',
            variants TEXT NOT NULL DEFAULT '[]',
            error_message TEXT,
            status_checked_at TIMESTAMP,
            last_status_check TIMESTAMP,
            status_check_count INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_songs_provider_task_id ON songs(provider_task_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
