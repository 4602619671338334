// Router assembly and server lifecycle

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::Method;
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::ServerConfig;
use crate::downloader::backends::{CobaltBackend, InnertubeBackend, YtDlpBackend};
use crate::downloader::catalog::{BackendFamily, CatalogBuilder, CatalogPolicy};
use crate::downloader::enricher::{CaptionEnricher, HttpCaptionFetcher};
use crate::downloader::orchestrator::ResolutionEngine;
use crate::downloader::playlist::PlaylistFetcher;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {address}: {reason}")]
    Bind { address: SocketAddr, reason: String },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Shared, read-only state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ResolutionEngine>,
    pub catalogs: Arc<CatalogBuilder>,
    pub enricher: Arc<CaptionEnricher>,
    pub playlists: Arc<PlaylistFetcher>,
    pub relay_window_bytes: usize,
    /// Parent of every per-download token; cancelled on shutdown
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the production backends from configuration
    pub fn new(config: &ServerConfig, shutdown: CancellationToken) -> Self {
        let ytdlp = YtDlpBackend::new(config.ytdlp_path.as_deref());
        tracing::info!(path = ytdlp.path(), "Using yt-dlp binary");

        let engine = ResolutionEngine::new(config.engine)
            .with_backend(BackendFamily::YtDlp, Arc::new(ytdlp))
            .with_backend(BackendFamily::Innertube, Arc::new(InnertubeBackend::new()))
            .with_backend(BackendFamily::Cobalt, Arc::new(CobaltBackend::new()));

        let catalogs = CatalogBuilder::new(
            CatalogPolicy::default(),
            config.credentials.clone(),
            config.catalog.clone(),
        );

        let enricher = CaptionEnricher::new(
            Box::new(HttpCaptionFetcher::new(config.network.clone())),
            config.caption_language.clone(),
        );

        let playlists = PlaylistFetcher::new(
            config.ytdlp_path.as_deref(),
            config.network.clone(),
            config.credentials.clone(),
        );

        Self {
            engine: Arc::new(engine),
            catalogs: Arc::new(catalogs),
            enricher: Arc::new(enricher),
            playlists: Arc::new(playlists),
            relay_window_bytes: config.relay_window_bytes,
            shutdown,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/", get(handlers::health))
        .route("/api/info", get(handlers::info))
        .route("/api/download", get(handlers::download))
        .route("/api/playlist", get(handlers::playlist))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serve until ctrl-c, then cancel in-flight relays and drain
///
/// # Errors
/// - `ServerError::Bind` - Failed to bind the listen address
/// - `ServerError::Serve` - The accept loop failed
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let shutdown = CancellationToken::new();
    let state = AppState::new(&config, shutdown.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_address)
        .await
        .map_err(|e| ServerError::Bind {
            address: config.bind_address,
            reason: e.to_string(),
        })?;

    tracing::info!(
        credentialed = config.credentials.is_some(),
        cobalt = config.catalog.cobalt_endpoint.is_some(),
        "Server starting on {}",
        config.bind_address
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested, cancelling active relays");
    shutdown.cancel();
}
