//! Route handlers. Every JSON response uses the `{status, message, result?}`
//! envelope, with `status` 0 on success and 1 on failure.

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{AppState, TOKEN_HEADER};
use crate::dispatch::{CandidateFile, Origin};
use crate::error::GatewayError;
use crate::naming::dotted_extension;
use crate::validate::has_allowed_extension;

#[derive(Debug, Serialize)]
struct ApiResponse<T> {
    status: u8,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<T>,
}

fn success<T: Serialize>(message: &str, result: Option<T>) -> Response {
    Json(ApiResponse { status: 0, message: message.to_string(), result }).into_response()
}

/// A failed request: HTTP status plus envelope message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        let status = match &e {
            GatewayError::InvalidArgument(_)
            | GatewayError::InvalidImage
            | GatewayError::FileTooLarge(_)
            | GatewayError::Download(_) => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("request failed: {e}");
        }
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body: ApiResponse<()> = ApiResponse { status: 1, message: self.message, result: None };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

async fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let token = headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()).unwrap_or_default();
    if state.auth.check_token(token).await? {
        Ok(())
    } else {
        log::warn!("rejected request with missing or expired token");
        Err(GatewayError::Unauthorized.into())
    }
}

fn parse_json<T: for<'de> Deserialize<'de>>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request("invalid request"))
}

/// GET /health
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// GET /channels
pub async fn channels(State(state): State<AppState>) -> Response {
    let registry = state.dispatcher.registry();
    success(
        "success",
        Some(json!({ "channels": registry.names(), "default": registry.default_name() })),
    )
}

#[derive(Deserialize)]
struct VerifyRequest {
    code: String,
}

/// POST /api/verify: exchange the access code for a token.
pub async fn verify(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let request: VerifyRequest = parse_json(&body)?;
    if !state.auth.verify_code(&request.code).await? {
        return Err(ApiError::new(StatusCode::UNAUTHORIZED, "wrong verification code"));
    }
    let token = state.auth.issue_token().await?;
    Ok(Json(json!({ "status": 0, "message": "verified", "token": token })).into_response())
}

#[derive(Deserialize)]
struct CheckRequest {
    token: String,
}

/// POST /api/check_verification
pub async fn check_verification(State(state): State<AppState>, body: Bytes) -> ApiResult {
    let request: CheckRequest = parse_json(&body)?;
    if state.auth.check_token(&request.token).await? {
        Ok(success::<()>("verification valid", None))
    } else {
        Err(ApiError::new(StatusCode::UNAUTHORIZED, "verification expired or invalid"))
    }
}

/// POST /upload: multipart `file` plus optional `channel`.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult {
    authorize(&state, &headers).await?;
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let mut file: Option<(String, Bytes)> = None;
    let mut channel: Option<String> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed form: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("cannot read file: {e}")))?;
                file = Some((filename, bytes));
            }
            "channel" => {
                channel = field.text().await.ok().filter(|c| !c.is_empty());
            }
            _ => {}
        }
    }

    let Some((filename, bytes)) = file else {
        return Err(ApiError::bad_request("no file"));
    };
    if filename.is_empty() {
        return Err(ApiError::bad_request("no file selected"));
    }
    if !has_allowed_extension(&filename) {
        log::warn!("unsupported file type: {filename}");
        return Err(ApiError::bad_request("supported image formats are JPG, PNG, GIF, BMP, WEBP"));
    }
    log::info!("upload request: file={filename}, channel={}", channel.as_deref().unwrap_or("default"));

    let candidate = CandidateFile::from_bytes(
        &state.temp_dir,
        Origin::Local(filename.clone()),
        &dotted_extension(&filename),
        &bytes,
    )?;
    let done = state.dispatcher.dispatch(candidate, channel.as_deref()).await?;
    Ok(success("upload succeeded", Some(done.result)))
}

#[derive(Deserialize)]
struct FromUrlRequest {
    url: String,
    channel: Option<String>,
}

/// POST /upload_from_url: download, then dispatch. Every failure is a 400.
pub async fn upload_from_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    authorize(&state, &headers).await?;
    let request: FromUrlRequest = parse_json(&body)?;

    let url = request.url.trim();
    if url.is_empty() {
        return Err(ApiError::bad_request("image URL must not be empty"));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        log::warn!("invalid URL: {url}");
        return Err(ApiError::bad_request("invalid URL, must start with http:// or https://"));
    }
    let preview: String = url.chars().take(100).collect();
    log::info!("URL upload request: {preview}");

    let outcome = async {
        let downloaded = state.fetcher.download(url).await?;
        let candidate = CandidateFile::from_bytes(
            &state.temp_dir,
            Origin::Remote(url.to_string()),
            &downloaded.extension,
            &downloaded.bytes,
        )?;
        state.dispatcher.dispatch(candidate, request.channel.as_deref()).await
    }
    .await;

    match outcome {
        Ok(done) => Ok(success("upload succeeded", Some(done.result))),
        Err(e) => {
            log::warn!("URL upload failed: {e}");
            Err(ApiError::bad_request(e.to_string()))
        }
    }
}

/// GET /history: newest first.
pub async fn history(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    authorize(&state, &headers).await?;
    let entries = state.history.list().await?;
    Ok(success("success", Some(entries)))
}

/// DELETE /delete_history/{id}
pub async fn delete_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult {
    authorize(&state, &headers).await?;
    if state.history.delete(&id).await? {
        Ok(success::<()>("deleted", None))
    } else {
        Err(GatewayError::NotFound(format!("history entry {id}")).into())
    }
}

/// DELETE /clear_history
pub async fn clear_history(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    authorize(&state, &headers).await?;
    let removed = state.history.clear().await?;
    log::info!("cleared {removed} history entries");
    Ok(success::<()>("cleared", None))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use image::ImageFormat;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::adapters::replaying::channel::ReplayingChannel;
    use crate::cassette::format::{Cassette, Interaction};
    use crate::cassette::replayer::CassetteReplayer;
    use crate::dispatch::Dispatcher;
    use crate::fetch::Fetcher;
    use crate::registry::ChannelRegistry;
    use crate::server::router;
    use crate::store::{memory, AuthStore, HistoryStore};
    use crate::validate::tests::encoded;

    const BOUNDARY: &str = "imgrelayboundary";

    fn ok_output(url: &str) -> Value {
        json!({"Ok": {"file_url": url, "width": 0, "height": 0}})
    }

    /// State whose `chatglm` and `jd` channels replay `outputs` in order.
    async fn state(outputs: Vec<Value>) -> AppState {
        let interactions = outputs
            .into_iter()
            .enumerate()
            .map(|(seq, output)| Interaction {
                seq: seq as u64,
                port: "chatglm".into(),
                method: "upload".into(),
                input: json!({}),
                output,
            })
            .collect();
        let cassette = Cassette {
            name: "handlers".into(),
            recorded_at: chrono::Utc::now(),
            commit: "test".into(),
            interactions,
        };
        let replayer = Arc::new(Mutex::new(CassetteReplayer::new(&cassette)));
        let registry = ChannelRegistry::builder()
            .register(Arc::new(ReplayingChannel::new("chatglm", None, Arc::clone(&replayer))))
            .unwrap()
            .register(Arc::new(ReplayingChannel::new("jd", Some(16), replayer)))
            .unwrap()
            .build("chatglm")
            .unwrap();

        let pool = memory().await;
        let history = HistoryStore::new(pool.clone());
        let auth = AuthStore::new(pool, 30);
        auth.ensure_code("admin123").await.unwrap();

        AppState {
            dispatcher: Arc::new(Dispatcher::new(Arc::new(registry), Arc::new(history.clone()))),
            history,
            auth,
            fetcher: Arc::new(Fetcher::new(reqwest::Client::new(), 1, Duration::ZERO)),
            temp_dir: std::env::temp_dir().join("imgrelay_handlers_test"),
        }
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(state.clone(), 8 * 1024 * 1024).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
        let mut builder =
            Request::builder().method(method).uri(uri).header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn upload_request(token: &str, filename: &str, bytes: &[u8], channel: Option<&str>) -> Request<Body> {
        let mut body = Vec::new();
        if let Some(channel) = channel {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"channel\"\r\n\r\n{channel}\r\n"
                )
                .as_bytes(),
            );
        }
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/upload")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .header(TOKEN_HEADER, token)
            .body(Body::from(body))
            .unwrap()
    }

    async fn token(state: &AppState) -> String {
        state.auth.issue_token().await.unwrap()
    }

    #[tokio::test]
    async fn verify_issues_token_for_correct_code() {
        let state = state(vec![]).await;

        let (status, body) =
            send(&state, json_request("POST", "/api/verify", None, &json!({"code": "wrong"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], 1);

        let (status, body) =
            send(&state, json_request("POST", "/api/verify", None, &json!({"code": "admin123"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], 0);
        let token = body["token"].as_str().unwrap().to_string();

        let check = json!({"token": token});
        let (status, _) = send(&state, json_request("POST", "/api/check_verification", None, &check)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) =
            send(&state, json_request("POST", "/api/check_verification", None, &json!({"token": "x"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn verify_without_code_is_bad_request() {
        let state = state(vec![]).await;
        let (status, body) = send(&state, json_request("POST", "/api/verify", None, &json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 1);
    }

    #[tokio::test]
    async fn protected_routes_require_token() {
        let state = state(vec![]).await;
        let png = encoded(2, 2, ImageFormat::Png);
        let (status, _) = send(&state, upload_request("bogus", "a.png", &png, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::builder().uri("/history").body(Body::empty()).unwrap();
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], 1);
    }

    #[tokio::test]
    async fn upload_returns_result_and_records_history() {
        let state = state(vec![ok_output("https://cdn.example.com/a.png")]).await;
        let token = token(&state).await;
        let png = encoded(30, 20, ImageFormat::Png);

        let (status, body) = send(&state, upload_request(&token, "cat.png", &png, None)).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], 0);
        assert_eq!(body["result"]["file_url"], "https://cdn.example.com/a.png");
        assert_eq!(body["result"]["width"], 30);
        assert_eq!(body["result"]["height"], 20);

        let request = Request::builder()
            .uri("/history")
            .header(TOKEN_HEADER, token.as_str())
            .body(Body::empty())
            .unwrap();
        let (_, body) = send(&state, request).await;
        let entries = body["result"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["file_name"], "cat.png");
        assert_eq!(entries[0]["channel"], "chatglm");
    }

    #[tokio::test]
    async fn upload_rejects_bad_extension_and_bad_content() {
        let state = state(vec![ok_output("https://x/1.png")]).await;
        let token = token(&state).await;

        let (status, _) = send(&state, upload_request(&token, "notes.txt", b"hello", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&state, upload_request(&token, "fake.png", b"not an image", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("Invalid image"));

        let (status, _) = send(&state, upload_request(&token, "", b"", None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_over_channel_limit_is_bad_request() {
        let state = state(vec![ok_output("https://x/1.png")]).await;
        let token = token(&state).await;
        let png = encoded(64, 64, ImageFormat::Png);

        let (status, body) = send(&state, upload_request(&token, "big.png", &png, Some("jd"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("exceeds"));
    }

    #[tokio::test]
    async fn channel_failure_is_server_error_on_upload() {
        let state = state(vec![json!({"Err": "chatglm upload failed"})]).await;
        let token = token(&state).await;
        let png = encoded(2, 2, ImageFormat::Png);

        let (status, body) = send(&state, upload_request(&token, "a.png", &png, Some("nope"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"].as_str().unwrap().contains("chatglm"));
    }

    #[tokio::test]
    async fn upload_from_url_validates_url() {
        let state = state(vec![]).await;
        let token = token(&state).await;

        for url in ["   ", "ftp://example.com/a.png"] {
            let request = json_request("POST", "/upload_from_url", Some(&token), &json!({"url": url}));
            let (status, body) = send(&state, request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["status"], 1);
        }
    }

    #[tokio::test]
    async fn upload_from_url_downloads_and_dispatches() {
        let mut server = mockito::Server::new_async().await;
        let _image = server
            .mock("GET", "/photos/sunset.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(encoded(12, 9, ImageFormat::Png))
            .create_async()
            .await;

        let state = state(vec![ok_output("https://cdn.example.com/s.png")]).await;
        let token = token(&state).await;
        let url = format!("{}/photos/sunset.png", server.url());

        let request = json_request("POST", "/upload_from_url", Some(&token), &json!({"url": url}));
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["result"]["width"], 12);

        let entries = state.history.list().await.unwrap();
        assert_eq!(entries[0].file_name, "sunset.png");
    }

    #[tokio::test]
    async fn upload_from_url_channel_failure_is_bad_request() {
        let mut server = mockito::Server::new_async().await;
        let _image = server
            .mock("GET", "/a.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body(encoded(2, 2, ImageFormat::Png))
            .create_async()
            .await;

        let state = state(vec![json!({"Err": "failed"})]).await;
        let token = token(&state).await;
        let request = json_request(
            "POST",
            "/upload_from_url",
            Some(&token),
            &json!({"url": format!("{}/a.png", server.url())}),
        );
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn history_delete_and_clear() {
        let state = state(vec![ok_output("https://x/1.png"), ok_output("https://x/2.png")]).await;
        let token = token(&state).await;
        let png = encoded(2, 2, ImageFormat::Png);
        send(&state, upload_request(&token, "one.png", &png, None)).await;
        send(&state, upload_request(&token, "two.png", &png, None)).await;

        let id = state.history.list().await.unwrap()[0].id.clone();
        let request = Request::builder()
            .method("DELETE")
            .uri(format!("/delete_history/{id}"))
            .header(TOKEN_HEADER, token.as_str())
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);

        let request = Request::builder()
            .method("DELETE")
            .uri("/delete_history/missing")
            .header(TOKEN_HEADER, token.as_str())
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let request = Request::builder()
            .method("DELETE")
            .uri("/clear_history")
            .header(TOKEN_HEADER, token.as_str())
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.history.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn channels_and_health_are_public() {
        let state = state(vec![]).await;
        let (status, body) =
            send(&state, Request::builder().uri("/channels").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["default"], "chatglm");
        assert_eq!(body["result"]["channels"], json!(["chatglm", "jd"]));

        let (status, body) =
            send(&state, Request::builder().uri("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
