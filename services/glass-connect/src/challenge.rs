//! Anti-forgery challenge issued with the consent page.

use serde::Serialize;
use tracing::debug;

use crate::error::ConnectError;
use crate::session::GlassSession;

/// Client configuration the consent page needs to start sign-in.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub client_id: String,
    pub discovery_url: String,
}

/// Values exposed to the consent page template.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RenderContext {
    pub state: String,
    pub client_id: String,
    pub discovery_url: String,
}

/// Mint a fresh state token and make it the session's only valid one.
///
/// Any previously pending state in `session` stops being accepted.
pub fn issue(session: &mut GlassSession, settings: &ClientSettings) -> Result<RenderContext, ConnectError> {
    let state = common::nonce::state_token()?;
    session.pending_state = Some(state.clone());
    debug!("state token issued");

    Ok(RenderContext {
        state,
        client_id: settings.client_id.clone(),
        discovery_url: settings.discovery_url.clone(),
    })
}
