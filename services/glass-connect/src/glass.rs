//! Glass connect routes
//!
//! Endpoints:
//! - GET  /glass/        : consent page carrying a fresh state token
//! - POST /glass/connect : exchange the posted one-time code and link the user
//!
//! Both run behind the session layer. The consent page writes only the
//! pending state and the connect endpoint writes only the verified identity,
//! so a page load overlapping a connect attempt keeps its new state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::{error, info};

use crate::challenge::{self, ClientSettings, RenderContext};
use crate::error::{ConnectError, error_body, message_body};
use crate::handshake::{ConnectHandshake, Connected, HandshakeRequest};
use crate::metrics;
use crate::session::{self as glass_session, session_layer};
use crate::templates::{GLASS_PAGE, TemplateRenderer};

/// Shared state for the glass handlers.
#[derive(Clone)]
pub struct GlassState {
    handshake: Arc<ConnectHandshake>,
    renderer: Arc<TemplateRenderer>,
    client: ClientSettings,
    session_ttl: Duration,
    secure_cookies: bool,
}

impl GlassState {
    pub fn new(
        handshake: ConnectHandshake,
        renderer: TemplateRenderer,
        client: ClientSettings,
        session_ttl: Duration,
        secure_cookies: bool,
    ) -> Self {
        Self {
            handshake: Arc::new(handshake),
            renderer: Arc::new(renderer),
            client,
            session_ttl,
            secure_cookies,
        }
    }
}

/// Build the router for the consent page and connect endpoint.
pub fn build_glass_router(state: GlassState) -> Router {
    let sessions = session_layer(state.session_ttl, state.secure_cookies);
    Router::new()
        .route("/glass/", get(glass_page))
        .route("/glass/connect", post(glass_connect))
        .layer(sessions)
        .with_state(state)
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// GET /glass/: issue a challenge and render the consent page.
async fn glass_page(State(state): State<GlassState>, session: Session) -> Response {
    let context = match issue_challenge(&state, &session).await {
        Ok(context) => context,
        Err(e) => {
            error!(error = %e, reason = e.reason(), "failed to issue state token");
            return e.into_response();
        }
    };

    match state.renderer.render(GLASS_PAGE, &context) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "failed to render consent page");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to render page."),
            )
        }
    }
}

async fn issue_challenge(
    state: &GlassState,
    session: &Session,
) -> Result<RenderContext, ConnectError> {
    let mut current = glass_session::read(session).await?;
    let context = challenge::issue(&mut current, &state.client)?;
    glass_session::set_pending_state(session, &context.state).await?;
    metrics::record_challenge();
    Ok(context)
}

/// Query parameters of the connect request. Missing values compare as empty.
#[derive(Deserialize)]
struct ConnectParams {
    #[serde(default)]
    state: String,
    #[serde(default)]
    gplus_id: String,
}

/// POST /glass/connect: run the connect handshake for the posted code.
async fn glass_connect(
    State(state): State<GlassState>,
    session: Session,
    Query(params): Query<ConnectParams>,
    body: String,
) -> Response {
    let started = Instant::now();
    let result = connect(&state, &session, params, body).await;

    let elapsed = started.elapsed().as_secs_f64();
    match result {
        Ok(connected) => {
            metrics::record_connect(connected.outcome(), elapsed);
            info!(outcome = connected.outcome(), "connect request served");
            json_response(StatusCode::OK, message_body(connected.message()))
        }
        Err(e) => {
            metrics::record_connect(e.reason(), elapsed);
            e.into_response()
        }
    }
}

async fn connect(
    state: &GlassState,
    session: &Session,
    params: ConnectParams,
    body: String,
) -> Result<Connected, ConnectError> {
    let mut current = glass_session::read(session).await?;
    let bound_before = current.identity_id.clone();

    let request = HandshakeRequest {
        state: params.state,
        claimed_identity: params.gplus_id,
        authorization_code: body.trim().to_string(),
    };
    let result = state.handshake.run(&mut current, request).await;

    // Only the identity is written back; the pending state may have been
    // rotated by a page load while the handshake ran.
    if current.identity_id != bound_before
        && let Some(identity_id) = current.identity_id.as_deref()
        && let Err(e) = glass_session::bind_identity(session, identity_id).await
    {
        error!(error = %e, "failed to bind identity to session");
        if result.is_ok() {
            return Err(e.into());
        }
    }
    result
}
