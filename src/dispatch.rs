//! Upload dispatcher: validate → select channel → size check → upload → record.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tempfile::NamedTempFile;

use crate::error::GatewayError;
use crate::naming::name_from_url;
use crate::ports::{Channel, HistoryEntry, HistorySink, UploadResult};
use crate::registry::ChannelRegistry;
use crate::validate::{self, ImageInfo};

/// Where a candidate file came from; decides its display name.
#[derive(Debug, Clone)]
pub enum Origin {
    /// Uploaded or named locally; the given name is kept.
    Local(String),
    /// Downloaded from a URL; the name is derived after validation.
    Remote(String),
}

impl Origin {
    fn label(&self) -> &str {
        match self {
            Self::Local(name) => name,
            Self::Remote(_) => "remote download",
        }
    }

    fn display_name(&self, info: &ImageInfo) -> String {
        match self {
            Self::Local(name) => name.clone(),
            Self::Remote(url) => name_from_url(url, info.extension),
        }
    }
}

/// A uniquely named temporary copy of the image awaiting dispatch.
///
/// The file is removed when the candidate is discarded or dropped.
pub struct CandidateFile {
    file: NamedTempFile,
    origin: Origin,
}

impl CandidateFile {
    /// Write `bytes` to a new temp file in `dir` ending in `suffix`
    /// (e.g., `".png"`).
    ///
    /// # Errors
    ///
    /// Returns an error if the temp file cannot be created or written.
    pub fn from_bytes(
        dir: &Path,
        origin: Origin,
        suffix: &str,
        bytes: &[u8],
    ) -> Result<Self, GatewayError> {
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::Builder::new().prefix("temp_").suffix(suffix).tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self { file, origin })
    }

    /// Path of the temp file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Remove the temp file, logging rather than failing on errors.
    pub fn discard(self) {
        let path = self.file.path().to_path_buf();
        if let Err(e) = self.file.close() {
            log::error!("failed to remove temp file {}: {e}", path.display());
        }
    }
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    /// Channel that performed the upload.
    pub channel: String,
    /// Display name recorded in history.
    pub file_name: String,
    /// Size of the uploaded file in bytes.
    pub file_size: u64,
    /// Normalized result.
    pub result: UploadResult,
}

/// Stateless per-request orchestration over a shared registry.
pub struct Dispatcher {
    registry: Arc<ChannelRegistry>,
    history: Arc<dyn HistorySink>,
}

impl Dispatcher {
    /// Create a dispatcher over the given registry and history sink.
    pub fn new(registry: Arc<ChannelRegistry>, history: Arc<dyn HistorySink>) -> Self {
        Self { registry, history }
    }

    /// The registry requests are resolved against.
    #[must_use]
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Resolve `requested`, substituting the default channel when it is
    /// absent or unknown.
    #[must_use]
    pub fn select(&self, requested: Option<&str>) -> Arc<dyn Channel> {
        let Some(name) = requested.filter(|n| !n.is_empty()) else {
            return self.registry.get_default();
        };
        self.registry.resolve(name).unwrap_or_else(|| {
            let fallback = self.registry.get_default();
            log::warn!("channel {name} is not registered, using default channel {}", fallback.name());
            fallback
        })
    }

    /// Validate and upload `candidate`, then record it in history.
    ///
    /// The candidate's temp file is removed on every exit path.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InvalidImage`] when the file is not a supported image
    /// - [`GatewayError::FileTooLarge`] when the channel's limit is exceeded
    /// - [`GatewayError::UploadFailed`] when the channel reports failure
    pub async fn dispatch(
        &self,
        candidate: CandidateFile,
        requested: Option<&str>,
    ) -> Result<Dispatched, GatewayError> {
        let outcome = self.run(&candidate, requested).await;
        candidate.discard();
        outcome
    }

    async fn run(
        &self,
        candidate: &CandidateFile,
        requested: Option<&str>,
    ) -> Result<Dispatched, GatewayError> {
        let path = candidate.path();
        let file_size = tokio::fs::metadata(path).await?.len();

        let info = validate::inspect(path, candidate.origin.label()).ok_or_else(|| {
            log::warn!("image validation failed: {}", candidate.origin.label());
            GatewayError::InvalidImage
        })?;
        let file = info.describe(candidate.origin.display_name(&info));
        log::debug!("{} validated as {}", file.filename, info.format);

        let channel = self.select(requested);
        let channel_name = channel.name().to_string();

        if let Err(e) = channel.check_file_size(path) {
            log::warn!("{} rejected by {channel_name}: {e}", file.filename);
            return Err(e);
        }

        log::info!(
            "uploading {} ({} bytes, {}x{}) to {channel_name}",
            file.filename,
            file_size,
            file.width,
            file.height
        );
        let Some(result) = channel.upload(path, &file).await else {
            log::error!("upload of {} to {channel_name} failed: channel returned no result", file.filename);
            return Err(GatewayError::UploadFailed { channel: channel_name });
        };
        let result = result.with_fallback_dimensions(&file);
        log::info!("uploaded {} to {channel_name}: {}", file.filename, result.file_url);

        let entry = HistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            file_name: file.filename.clone(),
            file_url: result.file_url.clone(),
            width: result.width,
            height: result.height,
            file_size,
            channel: channel_name.clone(),
            upload_time: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        if let Err(e) = self.history.record(entry).await {
            log::error!("failed to save upload history: {e}");
        }

        Ok(Dispatched { channel: channel_name, file_name: file.filename, file_size, result })
    }
}
