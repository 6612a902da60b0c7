//! Connect handshake
//!
//! Completes the sign-in started by the consent page. The handshake walks a
//! fixed sequence of states and stops at the first failed check:
//!
//! ```text
//! Start -> StateChecked -> CodeExchanged -> TokenVerified -> IdentityVerified
//!       -> AudienceVerified -> AlreadyLinked | Linking -> Done
//! ```
//!
//! The state check runs before any network call and redeems the state
//! token, so a token admits at most one attempt. Once the identity is
//! verified, an existing credential record short-circuits to `AlreadyLinked`
//! without touching the timeline. Otherwise the three timeline writes run in
//! order and the record is stored only if all of them succeed. Writes that
//! already went out are not undone when a later one fails.

use std::sync::Arc;

use google_auth::{CredentialRecord, CredentialRepository, IdentityProvider, OAuthTokens};
use mirror_timeline::{Contact, Subscription, Timeline, TimelineError, TimelineItem};
use tracing::{debug, info, warn};

use crate::error::ConnectError;
use crate::session::{GlassSession, RedeemedStates};

/// Progress of one connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Start,
    StateChecked,
    CodeExchanged,
    TokenVerified,
    IdentityVerified,
    AudienceVerified,
    AlreadyLinked,
    Linking,
    Done,
}

/// Caller-supplied inputs of one connect attempt.
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    pub state: String,
    pub claimed_identity: String,
    pub authorization_code: String,
}

/// Successful end of a connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connected {
    /// A record already existed; nothing was sent downstream
    AlreadyLinked,
    /// Timeline set up and credentials stored
    Linked,
}

impl Connected {
    pub fn message(&self) -> &'static str {
        match self {
            Self::AlreadyLinked => "Current user is already connected.",
            Self::Linked => "Successfully connected user.",
        }
    }

    /// Metric label for this outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::AlreadyLinked => "already_connected",
            Self::Linked => "connected",
        }
    }
}

/// The connect handshake with its injected collaborators.
pub struct ConnectHandshake {
    identity: Arc<dyn IdentityProvider>,
    timeline: Arc<dyn Timeline>,
    credentials: Arc<dyn CredentialRepository>,
    redeemed: RedeemedStates,
    client_id: String,
    base_url: String,
}

impl ConnectHandshake {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        timeline: Arc<dyn Timeline>,
        credentials: Arc<dyn CredentialRepository>,
        redeemed: RedeemedStates,
        client_id: String,
        base_url: String,
    ) -> Self {
        Self {
            identity,
            timeline,
            credentials,
            redeemed,
            client_id,
            base_url,
        }
    }

    /// Run one connect attempt against `session`.
    ///
    /// Once the state matches it is redeemed and cannot be presented again.
    /// After the token checks pass, `session` carries the verified identity.
    /// Every error is terminal; callers start over with a fresh challenge.
    pub async fn run(
        &self,
        session: &mut GlassSession,
        request: HandshakeRequest,
    ) -> Result<Connected, ConnectError> {
        let mut at = HandshakeState::Start;
        let result = self.drive(&mut at, session, request).await;
        match &result {
            Ok(connected) => info!(outcome = connected.outcome(), "connect handshake finished"),
            Err(e) => warn!(reason = e.reason(), state = ?at, error = %e, "connect handshake rejected"),
        }
        result
    }

    async fn drive(
        &self,
        at: &mut HandshakeState,
        session: &mut GlassSession,
        request: HandshakeRequest,
    ) -> Result<Connected, ConnectError> {
        let HandshakeRequest {
            state,
            claimed_identity,
            authorization_code,
        } = request;

        // Local check first: no network call for a forged, stale or replayed request
        if session.pending_state.as_deref() != Some(state.as_str())
            || !self.redeemed.redeem(&state).await
        {
            return Err(ConnectError::AntiForgeryMismatch);
        }
        advance(at, HandshakeState::StateChecked);

        let mut tokens = self
            .identity
            .exchange_code(&authorization_code)
            .await
            .map_err(|e| ConnectError::CodeExchangeFailed(e.to_string()))?;
        advance(at, HandshakeState::CodeExchanged);

        let info = self
            .identity
            .token_info(&tokens.access_token)
            .await
            .map_err(|e| match e {
                google_auth::Error::Introspection(payload) => {
                    ConnectError::ProviderIntrospectionError(payload)
                }
                other => ConnectError::ProviderIntrospectionError(serde_json::Value::String(
                    other.to_string(),
                )),
            })?;
        advance(at, HandshakeState::TokenVerified);

        if info.user_id != claimed_identity {
            return Err(ConnectError::IdentityMismatch);
        }
        advance(at, HandshakeState::IdentityVerified);

        if info.issued_to != self.client_id {
            return Err(ConnectError::AudienceMismatch);
        }
        advance(at, HandshakeState::AudienceVerified);

        session.identity_id = Some(claimed_identity.clone());
        let existing = self
            .credentials
            .get(&claimed_identity)
            .await
            .map_err(|e| ConnectError::CredentialStorage(e.to_string()))?;
        if existing.is_some() {
            advance(at, HandshakeState::AlreadyLinked);
            return Ok(Connected::AlreadyLinked);
        }
        advance(at, HandshakeState::Linking);

        let verify_token = common::nonce::verify_token()?;
        self.link(&mut tokens, &claimed_identity, &verify_token)
            .await?;

        let record = CredentialRecord {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            verify_token,
            expires: tokens.expires_at,
        };
        match self.credentials.put(&claimed_identity, record).await {
            Ok(()) => {}
            Err(google_auth::Error::AlreadyExists(_)) => {
                // A concurrent attempt for the same identity stored first
                warn!(identity_id = %claimed_identity, "identity linked concurrently, keeping existing record");
                advance(at, HandshakeState::Done);
                return Ok(Connected::AlreadyLinked);
            }
            Err(e) => return Err(ConnectError::CredentialStorage(e.to_string())),
        }
        advance(at, HandshakeState::Done);
        Ok(Connected::Linked)
    }

    /// The three timeline writes for a newly linked identity, in order.
    async fn link(
        &self,
        tokens: &mut OAuthTokens,
        identity_id: &str,
        verify_token: &str,
    ) -> Result<(), ConnectError> {
        let contact = Contact::sepia();
        let response = self
            .timeline
            .insert_contact(tokens, &contact)
            .await
            .map_err(downstream_error)?;
        info!(identity_id, %response, "contact registered");

        let subscription = Subscription::timeline_updates(identity_id, verify_token, &self.base_url);
        let response = self
            .timeline
            .insert_subscription(tokens, &subscription)
            .await
            .map_err(downstream_error)?;
        info!(identity_id, %response, "subscription registered");

        let welcome = TimelineItem::welcome();
        let response = self
            .timeline
            .insert_item(tokens, &welcome)
            .await
            .map_err(downstream_error)?;
        info!(identity_id, %response, "welcome message sent");

        Ok(())
    }
}

fn advance(at: &mut HandshakeState, next: HandshakeState) {
    debug!(from = ?*at, to = ?next, "handshake transition");
    *at = next;
}

fn downstream_error(err: TimelineError) -> ConnectError {
    match err {
        TimelineError::RefreshFailed(msg) => ConnectError::DownstreamRefreshFailed(msg),
        other => ConnectError::DownstreamRequestFailed(other.to_string()),
    }
}
