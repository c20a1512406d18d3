//! Configuration file loading with environment variable overrides.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "IMGRELAY_CONFIG";
/// Environment variable overriding `storage.data_dir`.
pub const DATA_DIR_ENV: &str = "IMGRELAY_DATA_DIR";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Where the database and temp files live.
    pub storage: StorageConfig,
    /// Dispatch settings.
    pub upload: UploadConfig,
    /// Remote download settings.
    pub fetch: FetchConfig,
    /// Access code settings.
    pub auth: AuthConfig,
    /// Per-channel settings keyed by channel name.
    pub channels: HashMap<String, ChannelConfig>,
}

/// `[server]`
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub bind: String,
    /// Request body limit in megabytes.
    pub max_body_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:5500".to_string(), max_body_mb: 64 }
    }
}

/// `[storage]`
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `app.db` and temp files.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: PathBuf::from("data") }
    }
}

/// `[upload]`
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Channel used when none, or an unknown one, is requested.
    pub default_channel: String,
    /// Timeout for each outbound channel request.
    pub timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self { default_channel: "chatglm".to_string(), timeout_secs: 60 }
    }
}

/// `[fetch]`
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Timeout for each download attempt.
    pub timeout_secs: u64,
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub initial_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout_secs: 30, attempts: 3, initial_backoff_ms: 1000 }
    }
}

/// `[auth]`
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Access code stored on first start.
    pub default_code: String,
    /// Token lifetime.
    pub token_ttl_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { default_code: "admin123".to_string(), token_ttl_days: 30 }
    }
}

/// `[channels.<name>]`
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Session cookie, for channels that need one.
    pub cookie: Option<String>,
    /// Maximum accepted file size in bytes.
    pub max_file_size: Option<u64>,
}

impl Config {
    /// Load configuration from the given path, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
    }

    /// Settings for `name`, or defaults.
    #[must_use]
    pub fn channel(&self, name: &str) -> ChannelConfig {
        self.channels.get(name).cloned().unwrap_or_default()
    }

    /// Cookie for `name`, preferring the environment variable `env_var`.
    #[must_use]
    pub fn channel_cookie(&self, name: &str, env_var: &str) -> Option<String> {
        std::env::var(env_var)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.channel(name).cookie)
    }

    /// Data directory, preferring `IMGRELAY_DATA_DIR`.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        std::env::var_os(DATA_DIR_ENV).map_or_else(|| self.storage.data_dir.clone(), PathBuf::from)
    }

    /// Per-request timeout for channel calls.
    #[must_use]
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload.timeout_secs)
    }
}

/// Discover the config file path using the resolution order:
/// 1. Explicit path (from `--config` flag)
/// 2. `IMGRELAY_CONFIG` environment variable
/// 3. `~/.config/imgrelay/config.toml`
#[must_use]
pub fn discover_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(p) = explicit {
        return PathBuf::from(p);
    }

    if let Ok(p) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(p);
    }

    default_config_path()
}

fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config/imgrelay/config.toml")
    } else {
        PathBuf::from("imgrelay.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:5500");
        assert_eq!(config.server.max_body_mb, 64);
        assert_eq!(config.upload.default_channel, "chatglm");
        assert_eq!(config.upload_timeout(), Duration::from_secs(60));
        assert_eq!(config.fetch.attempts, 3);
        assert_eq!(config.auth.default_code, "admin123");
        assert!(config.channel("jd").max_file_size.is_none());
    }

    #[test]
    fn load_nonexistent_returns_defaults() {
        let config = Config::load(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn load_valid_toml() {
        let dir = std::env::temp_dir().join("imgrelay_config_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
bind = "127.0.0.1:8080"

[upload]
default_channel = "jd"
timeout_secs = 5

[fetch]
attempts = 5

[channels.miyoushe]
cookie = "a=1; b=2"
max_file_size = 20971520

[channels.jd]
max_file_size = 1024
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.server.max_body_mb, 64);
        assert_eq!(config.upload.default_channel, "jd");
        assert_eq!(config.upload.timeout_secs, 5);
        assert_eq!(config.fetch.attempts, 5);
        assert_eq!(config.fetch.timeout_secs, 30);
        assert_eq!(config.channel("miyoushe").cookie.as_deref(), Some("a=1; b=2"));
        assert_eq!(config.channel("miyoushe").max_file_size, Some(20_971_520));
        assert_eq!(config.channel("jd").max_file_size, Some(1024));
        assert!(config.channel("chatglm").cookie.is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_invalid_toml() {
        let dir = std::env::temp_dir().join("imgrelay_config_bad_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").unwrap();

        assert!(Config::load(&path).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn cookie_falls_back_to_file_value() {
        let mut config = Config::default();
        config.channels.insert(
            "miyoushe".into(),
            ChannelConfig { cookie: Some("from-file".into()), max_file_size: None },
        );
        assert_eq!(
            config.channel_cookie("miyoushe", "IMGRELAY_TEST_UNSET_COOKIE").as_deref(),
            Some("from-file")
        );
    }

    #[test]
    fn discover_explicit_path() {
        let path = discover_config_path(Some("/tmp/my-config.toml"));
        assert_eq!(path, PathBuf::from("/tmp/my-config.toml"));
    }
}
