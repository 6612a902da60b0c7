//! Glass Connect
//!
//! Companion web service that links a Glass wearer's Google account:
//! 1. Serves a consent page carrying an anti-forgery state token
//! 2. Exchanges the posted one-time code and verifies the resulting token
//! 3. Seeds the wearer's timeline (contact, subscription, welcome card)
//! 4. Stores the user's credentials for later timeline notifications

mod challenge;
mod config;
mod error;
mod glass;
mod handshake;
mod metrics;
mod session;
mod templates;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use google_auth::{CredentialStore, GoogleOAuthClient};
use metrics_exporter_prometheus::PrometheusHandle;
use mirror_timeline::MirrorClient;

use crate::challenge::ClientSettings;
use crate::config::Config;
use crate::glass::{GlassState, build_glass_router};
use crate::handshake::ConnectHandshake;
use crate::session::RedeemedStates;
use crate::templates::TemplateRenderer;

/// How long in-flight requests may run after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// State for the operational endpoints
#[derive(Clone)]
struct AppState {
    started_at: Instant,
    credentials: Arc<CredentialStore>,
    prometheus: PrometheusHandle,
}

/// Build the axum router: operational endpoints plus the glass routes.
fn build_router(state: AppState, glass: GlassState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .merge(build_glass_router(glass))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filter from LOG_LEVEL then RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting glass-connect");

    let prometheus_handle = metrics::install_recorder()?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        base_url = %config.server.base_url,
        client_id = %config.oauth.client_id,
        api_url = %config.mirror.api_url(),
        "configuration loaded"
    );

    let client_secret = config.oauth.client_secret.clone().context(
        "no OAuth client secret: set GOOGLE_CLIENT_SECRET or oauth.client_secret_file",
    )?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.oauth.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let oauth = GoogleOAuthClient::new(http.clone(), config.oauth.client_id.clone(), client_secret)
        .with_endpoints(
            config.oauth.token_endpoint.clone(),
            config.oauth.tokeninfo_endpoint.clone(),
        );

    let credentials = Arc::new(
        CredentialStore::load(config.storage.credentials_path.clone())
            .await
            .with_context(|| {
                format!(
                    "failed to load credentials from {}",
                    config.storage.credentials_path.display()
                )
            })?,
    );
    info!(linked_users = credentials.len().await, "credential store loaded");

    let mirror = MirrorClient::new(http, config.mirror.api_url(), oauth.clone());

    let session_ttl = Duration::from_secs(config.server.session_ttl_secs);
    let handshake = ConnectHandshake::new(
        Arc::new(oauth),
        Arc::new(mirror),
        credentials.clone(),
        RedeemedStates::new(session_ttl),
        config.oauth.client_id.clone(),
        config.server.base_url.clone(),
    );

    let renderer = TemplateRenderer::new().context("failed to compile page templates")?;
    let glass_state = GlassState::new(
        handshake,
        renderer,
        ClientSettings {
            client_id: config.oauth.client_id.clone(),
            discovery_url: config.mirror.discovery_url.clone(),
        },
        session_ttl,
        config.server.base_url.starts_with("https://"),
    );

    let app_state = AppState {
        started_at: Instant::now(),
        credentials,
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, glass_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timer starts at signal receipt, not at server start
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: status, uptime, and number of linked users.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "linked_users": state.credentials.len().await,
    });

    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
