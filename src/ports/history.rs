//! History port: where the dispatcher records successful uploads.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// One recorded upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// UUID v4.
    pub id: String,
    /// Original file name supplied by the client.
    pub file_name: String,
    /// Final hosted URL.
    pub file_url: String,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Size of the uploaded file in bytes.
    pub file_size: u64,
    /// Channel that performed the upload.
    pub channel: String,
    /// Local time, `%Y-%m-%d %H:%M:%S`.
    pub upload_time: String,
}

/// Boxed future type returned by [`HistorySink::record`].
pub type RecordFuture<'a> = Pin<Box<dyn Future<Output = Result<(), GatewayError>> + Send + 'a>>;

/// Persists history entries.
pub trait HistorySink: Send + Sync {
    /// Append one entry.
    fn record(&self, entry: HistoryEntry) -> RecordFuture<'_>;
}
