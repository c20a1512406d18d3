//! Recording adapter for the `Channel` port.

use std::path::Path;
use std::sync::{Arc, Mutex};

use super::record_outcome;
use crate::cassette::recorder::CassetteRecorder;
use crate::error::GatewayError;
use crate::ports::channel::{Channel, UploadFuture, ValidatedFile};

/// Records upload outcomes while delegating to an inner channel.
pub struct RecordingChannel {
    inner: Arc<dyn Channel>,
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingChannel {
    /// Creates a new recording channel wrapping the given implementation.
    pub fn new(inner: Arc<dyn Channel>, recorder: Arc<Mutex<CassetteRecorder>>) -> Self {
        Self { inner, recorder }
    }
}

impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn max_file_size(&self) -> Option<u64> {
        self.inner.max_file_size()
    }

    fn check_file_size(&self, path: &Path) -> Result<(), GatewayError> {
        self.inner.check_file_size(path)
    }

    fn upload<'a>(&'a self, path: &'a Path, file: &'a ValidatedFile) -> UploadFuture<'a> {
        Box::pin(async move {
            let outcome = self.inner.upload(path, file).await;
            record_outcome(&self.recorder, self.inner.name(), "upload", file, outcome.as_ref());
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::channel::UploadResult;

    struct Fixed(Option<UploadResult>);

    impl Channel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn upload<'a>(&'a self, _path: &'a Path, _file: &'a ValidatedFile) -> UploadFuture<'a> {
            let outcome = self.0.clone();
            Box::pin(async move { outcome })
        }
    }

    fn validated() -> ValidatedFile {
        ValidatedFile {
            filename: "a.gif".into(),
            content_type: "image/gif".into(),
            width: 3,
            height: 4,
        }
    }

    #[tokio::test]
    async fn records_success_and_failure() {
        let dir = std::env::temp_dir().join("imgrelay_recording_channel_test");
        let path = dir.join("channels.cassette.yaml");
        let recorder = Arc::new(Mutex::new(CassetteRecorder::new(&path, "rec", "abc")));

        let ok = UploadResult { file_url: "https://x/a.gif".into(), width: 3, height: 4 };
        let good = RecordingChannel::new(Arc::new(Fixed(Some(ok.clone()))), Arc::clone(&recorder));
        let bad = RecordingChannel::new(Arc::new(Fixed(None)), Arc::clone(&recorder));

        assert_eq!(good.name(), "fixed");
        assert_eq!(good.upload(Path::new("a.gif"), &validated()).await, Some(ok));
        assert_eq!(bad.upload(Path::new("a.gif"), &validated()).await, None);

        drop(good);
        drop(bad);
        let recorder = Arc::try_unwrap(recorder).unwrap().into_inner().unwrap();
        assert_eq!(recorder.interaction_count(), 2);
        recorder.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("https://x/a.gif"));
        assert!(content.contains("Err"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
