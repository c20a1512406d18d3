//! Channel port: one implementation per third-party image host.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, GatewayError};

const MB: f64 = 1024.0 * 1024.0;

/// Trusted description of a candidate image, produced by validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedFile {
    /// File name to present to the backend.
    pub filename: String,
    /// MIME type detected from the pixel data (e.g., `"image/png"`).
    pub content_type: String,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
}

/// Normalized result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Absolute, directly fetchable URL of the hosted image.
    pub file_url: String,
    /// Pixel width (0 when unknown).
    pub width: u32,
    /// Pixel height (0 when unknown).
    pub height: u32,
}

impl UploadResult {
    /// Replace zero dimensions with the validated ones.
    #[must_use]
    pub fn with_fallback_dimensions(mut self, file: &ValidatedFile) -> Self {
        if self.width == 0 {
            self.width = file.width;
        }
        if self.height == 0 {
            self.height = file.height;
        }
        self
    }
}

/// Boxed future type returned by [`Channel::upload`].
///
/// `None` is the only failure signal a channel reports.
pub type UploadFuture<'a> = Pin<Box<dyn Future<Output = Option<UploadResult>> + Send + 'a>>;

/// Uploads an image file to one third-party host.
pub trait Channel: Send + Sync {
    /// Stable identifier used for lookup and log prefixes.
    fn name(&self) -> &str;

    /// Maximum accepted file size in bytes; `None` means unlimited.
    fn max_file_size(&self) -> Option<u64> {
        None
    }

    /// Check the on-disk size of `path` against [`Channel::max_file_size`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::FileTooLarge`] with a human-readable message
    /// when the limit is exceeded, or [`GatewayError::Io`] when the file
    /// cannot be inspected.
    fn check_file_size(&self, path: &Path) -> Result<(), GatewayError> {
        let Some(max) = self.max_file_size() else {
            return Ok(());
        };
        let actual = std::fs::metadata(path)?.len();
        check_size(actual, Some(max)).map_err(GatewayError::FileTooLarge)
    }

    /// Upload the file at `path`, described by `file`.
    ///
    /// Transport, HTTP and backend-reported failures are logged with the
    /// channel name as prefix and returned as `None`.
    fn upload<'a>(&'a self, path: &'a Path, file: &'a ValidatedFile) -> UploadFuture<'a>;
}

/// Compare a byte count against an optional limit (inclusive).
///
/// # Errors
///
/// Returns the message shown to the caller when `actual` exceeds `max`.
pub fn check_size(actual: u64, max: Option<u64>) -> Result<(), String> {
    match max {
        Some(max) if actual > max => {
            #[allow(clippy::cast_precision_loss)]
            let (actual_mb, max_mb) = (actual as f64 / MB, max as f64 / MB);
            Err(format!("file size {actual_mb:.2}MB exceeds the {max_mb:.0}MB limit"))
        }
        _ => Ok(()),
    }
}

/// Collapse a channel-internal outcome into the port's `Option` contract.
pub fn settle(channel: &str, outcome: Result<UploadResult, ChannelError>) -> Option<UploadResult> {
    match outcome {
        Ok(result) => {
            log::info!("[{channel}] upload succeeded: {}", result.file_url);
            Some(result)
        }
        Err(e) => {
            log::error!("[{channel}] upload failed: {e}");
            None
        }
    }
}
