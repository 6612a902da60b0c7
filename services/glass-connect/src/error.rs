//! Connect flow errors
//!
//! Every failure of the challenge or the connect handshake ends the request.
//! Each variant carries a fixed HTTP status and a machine-readable reason,
//! and renders itself as the JSON error body the consent page expects:
//! `{"error": {"code": <status>, "message": <text>}}`.
//!
//! The one exception is `ProviderIntrospectionError`, whose body is the
//! identity provider's own error payload relayed verbatim.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Terminal rejection of a challenge or connect attempt.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Invalid state parameter")]
    AntiForgeryMismatch,

    #[error("Failed to upgrade the authorization code.")]
    CodeExchangeFailed(String),

    #[error("token introspection failed: {0}")]
    ProviderIntrospectionError(serde_json::Value),

    #[error("Token's user ID doesn't match given user ID.")]
    IdentityMismatch,

    #[error("Token's client ID does not match the app's client ID")]
    AudienceMismatch,

    #[error("Failed to refresh access token.")]
    DownstreamRefreshFailed(String),

    #[error("Failed to insert timeline data.")]
    DownstreamRequestFailed(String),

    #[error("Failed to store credentials.")]
    CredentialStorage(String),

    #[error("Random source unavailable.")]
    RandomSourceUnavailable(String),

    #[error("Session unavailable.")]
    SessionUnavailable(String),
}

impl ConnectError {
    /// HTTP status for this rejection.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::AntiForgeryMismatch
            | Self::CodeExchangeFailed(_)
            | Self::IdentityMismatch
            | Self::AudienceMismatch => StatusCode::UNAUTHORIZED,
            Self::ProviderIntrospectionError(_)
            | Self::DownstreamRefreshFailed(_)
            | Self::DownstreamRequestFailed(_)
            | Self::CredentialStorage(_)
            | Self::RandomSourceUnavailable(_)
            | Self::SessionUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable reason code, used for logs and metric labels.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::AntiForgeryMismatch => "invalid_state",
            Self::CodeExchangeFailed(_) => "exchange_failed",
            Self::ProviderIntrospectionError(_) => "introspection_error",
            Self::IdentityMismatch => "user_id_mismatch",
            Self::AudienceMismatch => "client_id_mismatch",
            Self::DownstreamRefreshFailed(_) => "refresh_failed",
            Self::DownstreamRequestFailed(_) => "timeline_error",
            Self::CredentialStorage(_) => "storage_error",
            Self::RandomSourceUnavailable(_) => "random_source_unavailable",
            Self::SessionUnavailable(_) => "session_error",
        }
    }

    /// JSON body sent to the client.
    pub fn body(&self) -> serde_json::Value {
        match self {
            Self::ProviderIntrospectionError(payload) => payload.clone(),
            other => error_body(other.status(), &other.to_string()),
        }
    }
}

impl From<common::Error> for ConnectError {
    fn from(err: common::Error) -> Self {
        Self::RandomSourceUnavailable(err.to_string())
    }
}

impl From<tower_sessions::session::Error> for ConnectError {
    fn from(err: tower_sessions::session::Error) -> Self {
        Self::SessionUnavailable(err.to_string())
    }
}

/// Error body in the shape `{"error": {"code": …, "message": …}}`.
pub fn error_body(status: StatusCode, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "code": status.as_u16(),
            "message": message,
        }
    })
}

/// Success body in the shape `{"message": …}`.
pub fn message_body(message: &str) -> serde_json::Value {
    serde_json::json!({ "message": message })
}

impl IntoResponse for ConnectError {
    fn into_response(self) -> Response {
        (
            self.status(),
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            self.body().to_string(),
        )
            .into_response()
    }
}
