//! Service context: builds the channel registry for the selected mode.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::adapters::live::chatglm::{self, ChatGlmChannel};
use crate::adapters::live::jd::{self, JdChannel};
use crate::adapters::live::miyoushe::{self, MiyousheChannel};
use crate::adapters::live::{browser_client, plain_client};
use crate::adapters::recording::channel::RecordingChannel;
use crate::adapters::replaying::channel::ReplayingChannel;
use crate::cassette::replayer::CassetteReplayer;
use crate::cassette::recorder::CassetteRecorder;
use crate::config::Config;
use crate::error::GatewayError;
use crate::ports::Channel;
use crate::registry::ChannelRegistry;

/// Replays channel outcomes from this cassette instead of calling hosts.
pub const REPLAY_ENV: &str = "IMGRELAY_REPLAY";
/// Records live channel outcomes when set to `1` or `true`.
pub const REC_ENV: &str = "IMGRELAY_REC";

/// Names of the channels built into the gateway.
pub const BUILTIN_CHANNELS: [&str; 3] = [chatglm::NAME, jd::NAME, miyoushe::NAME];

/// Everything a command needs to dispatch uploads.
pub struct ServiceContext {
    /// Registry shared by every request.
    pub registry: Arc<ChannelRegistry>,
}

/// Handle to a recording session that must be finished after use.
pub struct RecordingSession {
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingSession {
    /// Finish the recording and write the cassette to disk.
    ///
    /// Every context built from this session must be dropped first.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette file cannot be written.
    pub fn finish(self) -> Result<PathBuf, String> {
        let recorder = Arc::try_unwrap(self.recorder)
            .map_err(|_| "Recording channels still have references".to_string())?
            .into_inner()
            .map_err(|e| format!("Recorder lock poisoned: {e}"))?;
        log::info!(
            "writing {} recorded interactions to {}",
            recorder.interaction_count(),
            recorder.path().display()
        );
        recorder.finish().map_err(|e| format!("Failed to write cassette: {e}"))
    }
}

impl ServiceContext {
    /// Pick the mode from `IMGRELAY_REPLAY` / `IMGRELAY_REC`.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be built.
    pub fn from_env(config: &Config) -> Result<(Self, Option<RecordingSession>), GatewayError> {
        if let Ok(cassette) = std::env::var(REPLAY_ENV) {
            log::info!("replaying channels from {cassette}");
            return Ok((Self::replaying(Path::new(&cassette), config)?, None));
        }
        if std::env::var(REC_ENV).is_ok_and(|v| v == "1" || v == "true") {
            log::info!("recording channel outcomes");
            let (ctx, session) = Self::recording(config)?;
            return Ok((ctx, Some(session)));
        }
        Ok((Self::live(config)?, None))
    }

    /// Create a live context talking to the real hosts.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built or the default
    /// channel is not registered.
    pub fn live(config: &Config) -> Result<Self, GatewayError> {
        Self::with_channels(live_channels(config)?, config)
    }

    /// Create a recording context that wraps every live channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the live context cannot be built.
    pub fn recording(config: &Config) -> Result<(Self, RecordingSession), GatewayError> {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string();
        let path = PathBuf::from(".imgrelay/cassettes")
            .join(&timestamp)
            .join("channels.cassette.yaml");
        let recorder = Arc::new(Mutex::new(CassetteRecorder::new(
            path,
            format!("{timestamp}-channels"),
            &get_commit_hash(),
        )));

        let channels = live_channels(config)?
            .into_iter()
            .map(|inner| {
                Arc::new(RecordingChannel::new(inner, Arc::clone(&recorder))) as Arc<dyn Channel>
            })
            .collect();

        let ctx = Self::with_channels(channels, config)?;
        Ok((ctx, RecordingSession { recorder }))
    }

    /// Create a replaying context from a cassette file.
    ///
    /// Every built-in channel name is registered, plus any other port the
    /// cassette mentions.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette cannot be loaded.
    pub fn replaying(path: &Path, config: &Config) -> Result<Self, GatewayError> {
        let replayer = CassetteReplayer::open(path)?;

        let mut names: Vec<String> = BUILTIN_CHANNELS.iter().map(ToString::to_string).collect();
        for port in replayer.ports() {
            if !names.contains(&port) {
                names.push(port);
            }
        }

        let replayer = Arc::new(Mutex::new(replayer));
        let channels = names
            .into_iter()
            .map(|name| {
                let max = config.channel(&name).max_file_size;
                Arc::new(ReplayingChannel::new(name, max, Arc::clone(&replayer))) as Arc<dyn Channel>
            })
            .collect();
        Self::with_channels(channels, config)
    }

    fn with_channels(
        channels: Vec<Arc<dyn Channel>>,
        config: &Config,
    ) -> Result<Self, GatewayError> {
        let registry = channels
            .into_iter()
            .try_fold(ChannelRegistry::builder(), |builder, channel| builder.register(channel))?
            .build(&config.upload.default_channel)?;
        log::info!(
            "channels: {} (default {})",
            registry.names().join(", "),
            registry.default_name()
        );
        Ok(Self { registry: Arc::new(registry) })
    }
}

fn live_channels(config: &Config) -> Result<Vec<Arc<dyn Channel>>, GatewayError> {
    let timeout = config.upload_timeout();
    let browser = browser_client(timeout)?;
    let plain = plain_client(timeout)?;

    let chatglm = ChatGlmChannel::new(browser.clone())
        .with_max_file_size(config.channel(chatglm::NAME).max_file_size);
    let jd = JdChannel::new(browser).with_max_file_size(config.channel(jd::NAME).max_file_size);
    let miyoushe =
        MiyousheChannel::new(plain, config.channel_cookie(miyoushe::NAME, miyoushe::COOKIE_ENV))
            .with_max_file_size(config.channel(miyoushe::NAME).max_file_size);

    Ok(vec![Arc::new(chatglm) as Arc<dyn Channel>, Arc::new(jd), Arc::new(miyoushe)])
}

/// Get the current git commit hash, or "unknown" if unavailable.
fn get_commit_hash() -> String {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map_or_else(|| "unknown".to_string(), |s| s.trim().to_string())
}
