//! Google OAuth library for the Glass connect flow
//!
//! Provides authorization code exchange, token refresh, tokeninfo
//! introspection, and credential file storage. This crate has no dependency
//! on the service binary and can be tested on its own.
//!
//! Connect flow:
//! 1. The consent page posts a one-time code to the service
//! 2. Service calls `GoogleOAuthClient::exchange_code()`
//! 3. Service checks the token with `GoogleOAuthClient::token_info()`
//! 4. Credentials stored via `CredentialStore::insert_new()`
//! 5. Timeline calls use `GoogleOAuthClient::refresh()` when the token expires

pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;
pub mod tokeninfo;

pub use constants::*;
pub use credentials::{CredentialRecord, CredentialRepository, CredentialStore};
pub use error::{Error, Result};
pub use token::{GoogleOAuthClient, OAuthTokens, TokenResponse, now_millis};
pub use tokeninfo::TokenInfo;

use std::future::Future;
use std::pin::Pin;

/// The identity provider operations the connect handshake depends on.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn IdentityProvider>`).
pub trait IdentityProvider: Send + Sync {
    /// Exchange a one-time authorization code for tokens.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<OAuthTokens>> + Send + 'a>>;

    /// Report the subject and audience of an access token.
    fn token_info<'a>(
        &'a self,
        access_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenInfo>> + Send + 'a>>;
}

impl IdentityProvider for GoogleOAuthClient {
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<OAuthTokens>> + Send + 'a>> {
        Box::pin(GoogleOAuthClient::exchange_code(self, code))
    }

    fn token_info<'a>(
        &'a self,
        access_token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TokenInfo>> + Send + 'a>> {
        Box::pin(GoogleOAuthClient::token_info(self, access_token))
    }
}
