//! Browser sessions
//!
//! Sessions are managed by `tower-sessions` over an in-memory store. The
//! store mints the ids, which travel in an HTTP-only cookie scoped to
//! `/glass`; an id the store does not know starts a fresh session. The two
//! fields the connect flow needs live under separate keys so each handler
//! writes only the one it owns.
//!
//! Single use of a state token is enforced by [`RedeemedStates`], outside
//! the session record: two requests carrying the same session each work on
//! their own copy of it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};
use tracing::debug;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "glass_session";

const PENDING_STATE_KEY: &str = "pending_state";
const IDENTITY_KEY: &str = "identity_id";

/// The connect flow's view of a browser session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlassSession {
    /// State token of the most recent challenge, if one is outstanding
    pub pending_state: Option<String>,
    /// Identity verified by the last successful token check
    pub identity_id: Option<String>,
}

/// Session middleware: in-memory store, idle expiry after `ttl`.
pub fn session_layer(ttl: Duration, secure: bool) -> SessionManagerLayer<MemoryStore> {
    let idle = time::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
    SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE)
        .with_path("/glass")
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(secure)
        .with_expiry(Expiry::OnInactivity(idle))
}

/// Read both connect fields from `session`.
pub async fn read(session: &Session) -> Result<GlassSession, tower_sessions::session::Error> {
    Ok(GlassSession {
        pending_state: session.get(PENDING_STATE_KEY).await?,
        identity_id: session.get(IDENTITY_KEY).await?,
    })
}

/// Make `state` the session's only acceptable state token.
pub async fn set_pending_state(
    session: &Session,
    state: &str,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(PENDING_STATE_KEY, state).await
}

/// Record the verified identity and persist the session immediately, so the
/// binding survives an error response later in the request.
pub async fn bind_identity(
    session: &Session,
    identity_id: &str,
) -> Result<(), tower_sessions::session::Error> {
    session.insert(IDENTITY_KEY, identity_id).await?;
    session.save().await
}

/// State tokens already presented to the connect endpoint.
///
/// Entries are forgotten after `ttl`, the session idle lifetime; by then the
/// session that held the token has expired too.
#[derive(Clone)]
pub struct RedeemedStates {
    redeemed: Arc<Mutex<HashMap<String, Instant>>>,
    ttl: Duration,
}

impl RedeemedStates {
    pub fn new(ttl: Duration) -> Self {
        Self {
            redeemed: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Mark `state` as used. Returns `false` if it was used before.
    pub async fn redeem(&self, state: &str) -> bool {
        let mut redeemed = self.redeemed.lock().await;
        let ttl = self.ttl;
        redeemed.retain(|_, at| at.elapsed() < ttl);
        if redeemed.contains_key(state) {
            debug!("state token replayed");
            return false;
        }
        redeemed.insert(state.to_string(), Instant::now());
        true
    }
}
