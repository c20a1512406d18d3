//! Live channel for the JD feedback image relay.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use crate::error::ChannelError;
use crate::ports::channel::{settle, Channel, UploadFuture, UploadResult, ValidatedFile};

/// Channel name used for lookup and logging.
pub const NAME: &str = "jd";

const JD_UPLOAD_URL: &str = "https://pic.jd.com/0/32ac1cd9ca1543e2a9cce60a4c9be94e";
const JD_CDN_PREFIX: &str = "https://img20.360buyimg.com/openfeedback/";
const JD_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                             (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

/// Uploads to JD's CDN through the feedback form's image endpoint.
///
/// The backend answers with an object key only; the public URL is built
/// from a fixed CDN prefix and dimensions always come from validation.
pub struct JdChannel {
    client: Client,
    endpoint: String,
    max_file_size: Option<u64>,
}

impl JdChannel {
    /// Create a channel that posts to the public endpoint.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client, endpoint: JD_UPLOAD_URL.to_string(), max_file_size: None }
    }

    /// Override the upload endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the maximum accepted file size in bytes.
    #[must_use]
    pub fn with_max_file_size(mut self, max: Option<u64>) -> Self {
        self.max_file_size = max;
        self
    }

    async fn try_upload(
        &self,
        path: &Path,
        file: &ValidatedFile,
    ) -> Result<UploadResult, ChannelError> {
        let bytes = tokio::fs::read(path).await?;
        let part =
            Part::bytes(bytes).file_name(file.filename.clone()).mime_str(&file.content_type)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json, text/javascript, */*; q=0.01")
            .header("User-Agent", JD_USER_AGENT)
            .header("Origin", "https://feedback.jd.com")
            .header("Referer", "https://feedback.jd.com/")
            .header("Sec-Ch-Ua-Platform", "Windows")
            .header("Sec-Ch-Ua-Mobile", "?0")
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(ChannelError::http(status, &response_text));
        }

        let parsed: JdResponse = serde_json::from_str(&response_text)
            .map_err(|e| ChannelError::Malformed(format!("failed to parse response: {e}")))?;

        let key = match (parsed.id.as_str(), parsed.msg) {
            (Some("1"), Some(key)) if !key.is_empty() => key,
            (_, msg) => {
                return Err(ChannelError::Backend {
                    code: parsed.id.to_string(),
                    message: msg.unwrap_or_default(),
                });
            }
        };

        Ok(UploadResult { file_url: cdn_url(&key), width: file.width, height: file.height })
    }
}

/// Join the CDN prefix and an object key such as `jfs/t1/.../abc.png`.
fn cdn_url(key: &str) -> String {
    format!("{JD_CDN_PREFIX}{}", key.trim_start_matches('/'))
}

impl Channel for JdChannel {
    fn name(&self) -> &str {
        NAME
    }

    fn max_file_size(&self) -> Option<u64> {
        self.max_file_size
    }

    fn upload<'a>(&'a self, path: &'a Path, file: &'a ValidatedFile) -> UploadFuture<'a> {
        Box::pin(async move { settle(NAME, self.try_upload(path, file).await) })
    }
}

// --- JD API response types ---

#[derive(Deserialize)]
struct JdResponse {
    #[serde(default)]
    id: serde_json::Value,
    msg: Option<String>,
}
