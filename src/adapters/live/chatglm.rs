//! Live channel for the ChatGLM assistant file-upload API.

use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;

use crate::error::ChannelError;
use crate::ports::channel::{settle, Channel, UploadFuture, UploadResult, ValidatedFile};

/// Channel name used for lookup and logging.
pub const NAME: &str = "chatglm";

const CHATGLM_UPLOAD_URL: &str = "https://chatglm.cn/chatglm/backend-api/assistant/file_upload";

/// Uploads through ChatGLM's assistant attachment endpoint, posing as its web client.
pub struct ChatGlmChannel {
    client: Client,
    endpoint: String,
    max_file_size: Option<u64>,
}

impl ChatGlmChannel {
    /// Create a channel that posts to the public endpoint.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client, endpoint: CHATGLM_UPLOAD_URL.to_string(), max_file_size: None }
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
            .header("Accept", "application/json, text/plain, */*")
            .header("Accept-Language", "zh-CN,zh;q=0.9")
            .header("App-Name", "chatglm")
            .header("Connection", "keep-alive")
            .header("DNT", "1")
            .header("Origin", "https://chatglm.cn")
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(ChannelError::http(status, &response_text));
        }

        let parsed: ChatGlmResponse = serde_json::from_str(&response_text)
            .map_err(|e| ChannelError::Malformed(format!("failed to parse response: {e}")))?;

        if parsed.status != 0 {
            return Err(ChannelError::Backend {
                code: parsed.status.to_string(),
                message: parsed.message.unwrap_or_default(),
            });
        }

        let result =
            parsed.result.ok_or_else(|| ChannelError::Malformed("missing `result`".into()))?;
        if result.file_url.is_empty() {
            return Err(ChannelError::Malformed("empty `file_url`".into()));
        }

        Ok(UploadResult {
            file_url: result.file_url,
            width: result.width.unwrap_or(0),
            height: result.height.unwrap_or(0),
        }
        .with_fallback_dimensions(file))
    }
}

impl Channel for ChatGlmChannel {
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

// --- ChatGLM API response types ---

#[derive(Deserialize)]
struct ChatGlmResponse {
    status: i64,
    message: Option<String>,
    result: Option<ChatGlmResult>,
}

#[derive(Deserialize)]
struct ChatGlmResult {
    #[serde(default)]
    file_url: String,
    width: Option<u32>,
    height: Option<u32>,
}
