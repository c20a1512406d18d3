//! HTTP API.

mod handlers;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::dispatch::Dispatcher;
use crate::error::GatewayError;
use crate::fetch::Fetcher;
use crate::store::{AuthStore, HistoryStore};

/// Header carrying the access token.
pub const TOKEN_HEADER: &str = "X-Verification-Token";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Upload pipeline.
    pub dispatcher: Arc<Dispatcher>,
    /// History queries.
    pub history: HistoryStore,
    /// Access code and tokens.
    pub auth: AuthStore,
    /// Remote downloads.
    pub fetcher: Arc<Fetcher>,
    /// Where candidate files are written.
    pub temp_dir: PathBuf,
}

/// Build the router.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/channels", get(handlers::channels))
        .route("/api/verify", post(handlers::verify))
        .route("/api/check_verification", post(handlers::check_verification))
        .route("/upload", post(handlers::upload))
        .route("/upload_from_url", post(handlers::upload_from_url))
        .route("/history", get(handlers::history))
        .route("/delete_history/{id}", delete(handlers::delete_history))
        .route("/clear_history", delete(handlers::clear_history))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(state: AppState, bind: &str, max_body_bytes: usize) -> Result<(), GatewayError> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| GatewayError::Config(format!("invalid bind address {bind:?}: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    log::info!("imgrelay listening on http://{addr}");
    log::info!("channels: {}", state.dispatcher.registry().names().join(", "));

    axum::serve(listener, router(state, max_body_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("shutting down");
}
