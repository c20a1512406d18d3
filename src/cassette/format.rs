//! On-disk cassette format.
//!
//! A cassette is a YAML document holding every channel call made during one
//! recording session, in call order. Replaying reads the same document back.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// A recorded session of port interactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cassette {
    /// Human-readable session name.
    pub name: String,
    /// When the session was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Git commit the recording was made from.
    pub commit: String,
    /// Interactions in recording order.
    pub interactions: Vec<Interaction>,
}

/// One call through a port.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    /// Sequence number across the whole cassette.
    pub seq: u64,
    /// Port identifier; for channels, the channel name.
    pub port: String,
    /// Method name (e.g., `"upload"`).
    pub method: String,
    /// Serialized call input.
    pub input: serde_json::Value,
    /// Serialized call output, using the `Ok`/`Err` convention.
    pub output: serde_json::Value,
}

impl Cassette {
    /// An empty session stamped with the current time.
    pub fn empty(name: impl Into<String>, commit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            recorded_at: Utc::now(),
            commit: commit.into(),
            interactions: Vec::new(),
        }
    }

    /// Read a cassette from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the file is unreadable or not a cassette.
    pub fn load(path: &Path) -> Result<Self, GatewayError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("Failed to load cassette {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            GatewayError::Config(format!("Failed to load cassette {}: {e}", path.display()))
        })
    }

    /// Write the cassette as YAML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let yaml = serde_yaml::to_string(self).map_err(std::io::Error::other)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, yaml)
    }
}
