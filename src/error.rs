//! Error types for imgrelay.

use thiserror::Error;

/// Errors that can occur while serving or dispatching an upload.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration error (fatal at startup).
    #[error("Config error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A network error occurred outside of a channel.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Invalid argument or missing request field.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The candidate file is not a supported image.
    #[error("Invalid image file, supported formats are JPG, PNG, GIF, BMP, WEBP")]
    InvalidImage,

    /// The file exceeds the resolved channel's size limit.
    #[error("{0}")]
    FileTooLarge(String),

    /// The channel reported an upload failure.
    #[error("Upload to {channel} failed, check the channel configuration or retry later")]
    UploadFailed {
        /// Name of the channel that failed.
        channel: String,
    },

    /// The remote image could not be downloaded.
    #[error("Download failed: {0}")]
    Download(String),

    /// Missing, invalid or expired access token.
    #[error("Not verified or verification expired")]
    Unauthorized,

    /// A requested record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Failures inside a channel. These never cross the channel boundary; the
/// channel logs them and reports `None` to its caller.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Connection, timeout or body-read failure raised by the HTTP client.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The backend answered 2xx but reported a failure in its payload.
    #[error("backend rejected upload (code {code}): {message}")]
    Backend {
        /// Backend-internal status or return code.
        code: String,
        /// Backend message.
        message: String,
    },

    /// The backend response could not be interpreted.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The local file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A credential the channel needs is not configured.
    #[error("missing credential: {0}")]
    MissingCredential(String),
}

impl ChannelError {
    /// Build an [`ChannelError::Http`] from a status and body, keeping at most
    /// 500 bytes of the body.
    pub fn http(status: reqwest::StatusCode, body: &str) -> Self {
        Self::Http { status: status.as_u16(), body: truncate(body, 500) }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
