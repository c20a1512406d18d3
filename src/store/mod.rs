//! SQLite persistence for upload history and access tokens.

pub mod auth;
pub mod history;

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::error::GatewayError;

pub use auth::AuthStore;
pub use history::HistoryStore;

const DATABASE_FILE: &str = "app.db";

/// Open (creating if needed) `data_dir/app.db` in WAL mode and ensure the
/// schema exists.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the database
/// cannot be opened or migrated.
pub async fn open(data_dir: &Path) -> Result<SqlitePool, GatewayError> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join(DATABASE_FILE);
    log::info!("database path: {}", db_path.display());

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Create tables and indexes if they do not exist.
///
/// # Errors
///
/// Returns an error if a statement fails.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), GatewayError> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS upload_history (
            id TEXT PRIMARY KEY,
            file_name TEXT NOT NULL,
            file_url TEXT NOT NULL,
            width INTEGER DEFAULT 0,
            height INTEGER DEFAULT 0,
            file_size INTEGER DEFAULT 0,
            channel TEXT,
            upload_time TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_upload_time ON upload_history(upload_time DESC)")
        .execute(pool)
        .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS verification_config (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            code_hash TEXT NOT NULL,
            salt TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS valid_tokens (
            token TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_expires_at ON valid_tokens(expires_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Single-connection in-memory database with the schema applied.
#[cfg(test)]
pub(crate) async fn memory() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_schema(&pool).await.unwrap();
    pool
}
