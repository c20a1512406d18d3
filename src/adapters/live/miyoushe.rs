//! Live channel for the Miyoushe community image host.
//!
//! Uploads run in three steps, each handing a typed value to the next:
//!
//! 1. [`FileDigest`]: MD5 and extension of the local file.
//! 2. [`SignedPolicy`]: a one-time object-store policy requested from the
//!    community API with the digest and a session cookie.
//! 3. A multipart POST of the signed fields plus the file to the policy's
//!    host, which answers with the public URL.
//!
//! A non-zero `retcode` in either phase is a backend failure even when the
//! HTTP status is 200.

use std::path::Path;
use std::time::Duration;

use md5::{Digest, Md5};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::ChannelError;
use crate::ports::channel::{settle, Channel, UploadFuture, UploadResult, ValidatedFile};

/// Channel name used for lookup and logging.
pub const NAME: &str = "miyoushe";

/// Environment variable holding the session cookie.
pub const COOKIE_ENV: &str = "MIYOUSHE_COOKIE";

const UPLOAD_PARAMS_URL: &str = "https://bbs-api.miyoushe.com/apihub/wapi/getUploadParams";
const REFERER: &str = "https://www.miyoushe.com/";
const SEC_CH_UA: &str = r#""Google Chrome";v="143", "Chromium";v="143", "Not A(Brand";v="24""#;
const POLICY_TIMEOUT: Duration = Duration::from_secs(30);
const STORE_TIMEOUT: Duration = Duration::from_secs(60);

/// Uploads via Miyoushe's signed object-store flow.
pub struct MiyousheChannel {
    client: Client,
    policy_endpoint: String,
    cookie: Option<String>,
    max_file_size: Option<u64>,
}

/// Content hash and extension of the file being uploaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    /// Lowercase hex MD5 of the file bytes.
    pub md5: String,
    /// Lowercase extension without the dot.
    pub ext: String,
}

/// A server-issued upload authorization for the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPolicy {
    host: String,
    object_key: String,
    access_id: String,
    policy: String,
    signature: String,
    name: Option<String>,
    callback: Option<String>,
    callback_extra: String,
    content_type: Option<String>,
    extra_fields: Vec<(String, String)>,
}

impl MiyousheChannel {
    /// Create a channel using the given session cookie.
    #[must_use]
    pub fn new(client: Client, cookie: Option<String>) -> Self {
        Self {
            client,
            policy_endpoint: UPLOAD_PARAMS_URL.to_string(),
            cookie: cookie.filter(|c| !c.trim().is_empty()),
            max_file_size: None,
        }
    }

    /// Override the upload-policy endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.policy_endpoint = endpoint.into();
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
        let cookie = self.cookie.as_deref().ok_or_else(|| {
            ChannelError::MissingCredential(format!(
                "no session cookie configured, set {COOKIE_ENV}"
            ))
        })?;

        let bytes = tokio::fs::read(path).await?;
        let digest = FileDigest {
            md5: md5_hex(&bytes),
            ext: extension_of(path).unwrap_or_else(|| extension_for_mime(&file.content_type)),
        };
        log::info!("[{NAME}] file md5: {}", digest.md5);

        let policy = self.request_policy(cookie, &digest).await?;
        log::info!("[{NAME}] upload target: {}", policy.object_key);

        let file_name = path
            .file_name()
            .map_or_else(|| file.filename.clone(), |n| n.to_string_lossy().into_owned());
        let url = self.post_to_store(&policy, &digest, file_name, bytes).await?;

        Ok(UploadResult { file_url: url, width: file.width, height: file.height })
    }

    /// Phase 1: exchange the digest for a signed upload policy.
    async fn request_policy(
        &self,
        cookie: &str,
        digest: &FileDigest,
    ) -> Result<SignedPolicy, ChannelError> {
        let body = serde_json::json!({
            "md5": digest.md5,
            "ext": digest.ext,
            "biz": "community",
            "support_content_type": true,
            "support_extra_form_data": true,
            "extra": {
                "upload_source": "UPLOAD_SOURCE_COMMUNITY"
            }
        });

        let response = self
            .client
            .post(&self.policy_endpoint)
            .header("accept", "*/*")
            .header("accept-language", "zh-CN,zh;q=0.9,en;q=0.8")
            .header("cache-control", "no-cache")
            .header("pragma", "no-cache")
            .header("sec-ch-ua", SEC_CH_UA)
            .header("sec-ch-ua-mobile", "?0")
            .header("sec-ch-ua-platform", "\"Windows\"")
            .header("sec-fetch-dest", "empty")
            .header("sec-fetch-mode", "cors")
            .header("sec-fetch-site", "same-site")
            .header("x-rpc-app_version", "2.96.0")
            .header("referer", REFERER)
            .header("cookie", cookie_header(cookie))
            .json(&body)
            .timeout(POLICY_TIMEOUT)
            .send()
            .await?;

        let ticket: UploadTicket = read_envelope(response).await?;
        ticket.into_policy()
    }

    /// Phase 2: post the signed fields and the file bytes to the store host.
    async fn post_to_store(
        &self,
        policy: &SignedPolicy,
        digest: &FileDigest,
        file_name: String,
        bytes: Vec<u8>,
    ) -> Result<String, ChannelError> {
        let content_type = extension_mime(&digest.ext);

        let mut form = Form::new();
        if let Some(ref name) = policy.name {
            form = form.text("name", name.clone());
        }
        form = form.text("key", policy.object_key.clone());
        if let Some(ref callback) = policy.callback {
            form = form.text("callback", callback.clone());
        }
        form = form
            .text("success_action_status", "200")
            .text("x:extra", policy.callback_extra.clone())
            .text(
                "x-oss-content-type",
                policy.content_type.clone().unwrap_or_else(|| content_type.clone()),
            )
            .text("OSSAccessKeyId", policy.access_id.clone())
            .text("policy", policy.policy.clone())
            .text("signature", policy.signature.clone());
        for (key, value) in &policy.extra_fields {
            form = form.text(key.clone(), value.clone());
        }
        let part = Part::bytes(bytes).file_name(file_name).mime_str(&content_type)?;
        form = form.part("file", part);

        let response = self
            .client
            .post(&policy.host)
            .header("accept", "*/*")
            .header("accept-language", "zh-CN,zh;q=0.9,en;q=0.8")
            .header("cache-control", "no-cache")
            .header("pragma", "no-cache")
            .header("sec-ch-ua", SEC_CH_UA)
            .header("sec-ch-ua-mobile", "?0")
            .header("sec-ch-ua-platform", "\"Windows\"")
            .header("sec-fetch-dest", "empty")
            .header("sec-fetch-mode", "cors")
            .header("sec-fetch-site", "cross-site")
            .header("referer", REFERER)
            .multipart(form)
            .timeout(STORE_TIMEOUT)
            .send()
            .await?;

        let stored: StoredObject = read_envelope(response).await?;
        match stored.url {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(ChannelError::Malformed("store response has no `data.url`".into())),
        }
    }
}

impl Channel for MiyousheChannel {
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

/// Check HTTP status and `retcode`, then return `data`.
async fn read_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ChannelError> {
    let status = response.status();
    let response_text = response.text().await?;

    if !status.is_success() {
        return Err(ChannelError::http(status, &response_text));
    }

    let envelope: Envelope<T> = serde_json::from_str(&response_text)
        .map_err(|e| ChannelError::Malformed(format!("failed to parse response: {e}")))?;

    match envelope.retcode {
        Some(0) => envelope.data.ok_or_else(|| ChannelError::Malformed("missing `data`".into())),
        code => Err(ChannelError::Backend {
            code: code.map_or_else(|| "none".to_string(), |c| c.to_string()),
            message: envelope
                .message
                .or(envelope.msg)
                .unwrap_or_else(|| "unknown error".to_string()),
        }),
    }
}

fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .filter(|e| !e.is_empty())
}

fn extension_for_mime(content_type: &str) -> String {
    match content_type {
        "image/jpeg" => "jpg".to_string(),
        other => other.strip_prefix("image/").unwrap_or(other).to_string(),
    }
}

fn extension_mime(ext: &str) -> String {
    match ext {
        "png" => "image/png".to_string(),
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "gif" => "image/gif".to_string(),
        "webp" => "image/webp".to_string(),
        "bmp" => "image/bmp".to_string(),
        other => format!("image/{other}"),
    }
}

/// Parse `a=1; b=2` into pairs, dropping malformed items.
fn parse_cookie(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|item| {
            let (key, value) = item.trim().split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn cookie_header(raw: &str) -> String {
    parse_cookie(raw)
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// --- Miyoushe API response types ---

#[derive(Deserialize)]
struct Envelope<T> {
    retcode: Option<i64>,
    message: Option<String>,
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Deserialize)]
struct UploadTicket {
    file_name: Option<String>,
    params: Option<RawParams>,
    oss: Option<RawParams>,
}

#[derive(Deserialize, Default)]
struct RawParams {
    host: Option<String>,
    accessid: Option<String>,
    policy: Option<String>,
    signature: Option<String>,
    name: Option<String>,
    callback: Option<String>,
    #[serde(default)]
    callback_var: serde_json::Map<String, serde_json::Value>,
    x_oss_content_type: Option<String>,
    #[serde(default)]
    extra_form_data: Vec<ExtraField>,
}

#[derive(Deserialize)]
struct ExtraField {
    key: Option<String>,
    value: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct StoredObject {
    url: Option<String>,
}

impl UploadTicket {
    fn into_policy(self) -> Result<SignedPolicy, ChannelError> {
        let params = self.params.or(self.oss).unwrap_or_default();
        let required = |field: Option<String>, name: &str| {
            field.filter(|v| !v.is_empty()).ok_or_else(|| ChannelError::Backend {
                code: "0".into(),
                message: format!("upload params have no `{name}`"),
            })
        };

        let extra_fields = params
            .extra_form_data
            .into_iter()
            .filter_map(|field| match (field.key, field.value) {
                (Some(key), Some(value)) if !key.is_empty() && !value.is_null() => {
                    Some((key, value_to_string(&value)))
                }
                _ => None,
            })
            .collect();

        Ok(SignedPolicy {
            host: required(params.host, "host")?,
            object_key: required(self.file_name, "file_name")?,
            access_id: required(params.accessid, "accessid")?,
            policy: required(params.policy, "policy")?,
            signature: required(params.signature, "signature")?,
            name: params.name,
            callback: params.callback,
            callback_extra: params.callback_var.get("x:extra").map(value_to_string).unwrap_or_default(),
            content_type: params.x_oss_content_type,
            extra_fields,
        })
    }
}
