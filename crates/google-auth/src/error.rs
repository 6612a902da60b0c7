//! Error types for Google OAuth operations

/// Errors from OAuth exchange, introspection and credential storage.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    /// The tokeninfo endpoint answered with an `error` member; the payload is kept verbatim.
    #[error("token introspection failed: {0}")]
    Introspection(serde_json::Value),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("credentials already stored for {0}")]
    AlreadyExists(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
