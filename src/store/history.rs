//! Upload history table.

use sqlx::{Row, SqlitePool};

use crate::error::GatewayError;
use crate::ports::history::{HistoryEntry, HistorySink, RecordFuture};

/// Reads and writes `upload_history`.
#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    /// Wrap an open pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert one entry.
    ///
    /// # Errors
    ///
    /// Returns a database error if the insert fails.
    pub async fn insert(&self, entry: &HistoryEntry) -> Result<(), GatewayError> {
        sqlx::query(
            "INSERT INTO upload_history \
             (id, file_name, file_url, width, height, file_size, channel, upload_time) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.id.as_str())
        .bind(entry.file_name.as_str())
        .bind(entry.file_url.as_str())
        .bind(i64::from(entry.width))
        .bind(i64::from(entry.height))
        .bind(i64::try_from(entry.file_size).unwrap_or(i64::MAX))
        .bind(entry.channel.as_str())
        .bind(entry.upload_time.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns a database error if the query fails.
    pub async fn list(&self) -> Result<Vec<HistoryEntry>, GatewayError> {
        let rows = sqlx::query(
            "SELECT id, file_name, file_url, width, height, file_size, channel, upload_time \
             FROM upload_history ORDER BY upload_time DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let width: i64 = row.try_get("width")?;
            let height: i64 = row.try_get("height")?;
            let file_size: i64 = row.try_get("file_size")?;
            let channel: Option<String> = row.try_get("channel")?;
            entries.push(HistoryEntry {
                id: row.try_get("id")?,
                file_name: row.try_get("file_name")?,
                file_url: row.try_get("file_url")?,
                width: u32::try_from(width).unwrap_or(0),
                height: u32::try_from(height).unwrap_or(0),
                file_size: u64::try_from(file_size).unwrap_or(0),
                channel: channel.unwrap_or_default(),
                upload_time: row.try_get("upload_time")?,
            });
        }
        Ok(entries)
    }

    /// Delete one entry. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns a database error if the delete fails.
    pub async fn delete(&self, id: &str) -> Result<bool, GatewayError> {
        let result = sqlx::query("DELETE FROM upload_history WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every entry. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a database error if the delete fails.
    pub async fn clear(&self) -> Result<u64, GatewayError> {
        let result = sqlx::query("DELETE FROM upload_history").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

impl HistorySink for HistoryStore {
    fn record(&self, entry: HistoryEntry) -> RecordFuture<'_> {
        Box::pin(async move { self.insert(&entry).await })
    }
}
