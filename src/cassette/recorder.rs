//! Collects channel calls while recording.

use std::path::{Path, PathBuf};

use chrono::Utc;

use super::format::{Cassette, Interaction};

/// Accumulates interactions in memory and saves them as one cassette.
#[derive(Debug)]
pub struct CassetteRecorder {
    path: PathBuf,
    cassette: Cassette,
}

impl CassetteRecorder {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>, commit: impl Into<String>) -> Self {
        Self { path: path.into(), cassette: Cassette::empty(name, commit) }
    }

    /// Append a call; `seq` is its position in the session.
    pub fn record(
        &mut self,
        port: impl Into<String>,
        method: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
    ) {
        let seq = self.cassette.interactions.len() as u64;
        self.cassette.interactions.push(Interaction {
            seq,
            port: port.into(),
            method: method.into(),
            input,
            output,
        });
    }

    #[must_use]
    pub fn interaction_count(&self) -> usize {
        self.cassette.interactions.len()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stamp the session end time and write the cassette.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn finish(mut self) -> std::io::Result<PathBuf> {
        self.cassette.recorded_at = Utc::now();
        self.cassette.save(&self.path)?;
        Ok(self.path)
    }
}
