//! Replaying adapter for the `Channel` port.

use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{next_output, replay_outcome};
use crate::cassette::replayer::CassetteReplayer;
use crate::ports::channel::{Channel, UploadFuture, UploadResult, ValidatedFile};

/// Serves recorded upload outcomes for one channel name.
pub struct ReplayingChannel {
    name: String,
    max_file_size: Option<u64>,
    replayer: Arc<Mutex<CassetteReplayer>>,
}

impl ReplayingChannel {
    /// Create a replaying channel backed by the given replayer.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        max_file_size: Option<u64>,
        replayer: Arc<Mutex<CassetteReplayer>>,
    ) -> Self {
        Self { name: name.into(), max_file_size, replayer }
    }
}

impl Channel for ReplayingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_file_size(&self) -> Option<u64> {
        self.max_file_size
    }

    fn upload<'a>(&'a self, _path: &'a Path, file: &'a ValidatedFile) -> UploadFuture<'a> {
        let output = next_output(&self.replayer, &self.name, "upload");
        Box::pin(async move {
            output
                .and_then(replay_outcome::<UploadResult>)
                .map(|result| result.with_fallback_dimensions(file))
        })
    }
}
