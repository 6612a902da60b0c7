//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (the one-time code posted by the consent page)
//! 2. Token refresh (when a timeline call finds the access token expired)
//!
//! Both operations POST a form to the configured token endpoint with
//! different grant types and authenticate with the client id and secret.

use std::time::{SystemTime, UNIX_EPOCH};

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{REDIRECT_URI, TOKEN_ENDPOINT, TOKENINFO_ENDPOINT};
use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// Google omits `refresh_token` on refresh responses and on exchanges for
/// users who already granted offline access, so it is optional here.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Credentials obtained from an exchange, kept current across refreshes.
///
/// `expires_at` is a unix timestamp in milliseconds; zero means unknown,
/// in which case the token is only refreshed after the API rejects it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: u64,
}

impl OAuthTokens {
    /// Convert a token endpoint response into absolute-expiry credentials.
    pub fn from_response(response: TokenResponse, now_millis: u64) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: expiry_from(response.expires_in, now_millis),
        }
    }

    /// Whether the access token is past its expiry at `now_millis`.
    pub fn is_expired(&self, now_millis: u64) -> bool {
        self.expires_at != 0 && now_millis >= self.expires_at
    }
}

impl std::fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

fn expiry_from(expires_in: Option<u64>, now_millis: u64) -> u64 {
    expires_in
        .map(|secs| now_millis + secs * 1000)
        .unwrap_or(0)
}

/// Current time as unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// HTTP client for the Google OAuth endpoints, bound to one OAuth client.
#[derive(Clone)]
pub struct GoogleOAuthClient {
    pub(crate) http: reqwest::Client,
    client_id: String,
    client_secret: Secret<String>,
    token_endpoint: String,
    pub(crate) tokeninfo_endpoint: String,
}

impl GoogleOAuthClient {
    /// Create a client talking to Google's public endpoints.
    pub fn new(http: reqwest::Client, client_id: String, client_secret: Secret<String>) -> Self {
        Self {
            http,
            client_id,
            client_secret,
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            tokeninfo_endpoint: TOKENINFO_ENDPOINT.to_string(),
        }
    }

    /// Override the token and tokeninfo endpoints (emulators, tests).
    pub fn with_endpoints(mut self, token_endpoint: String, tokeninfo_endpoint: String) -> Self {
        self.token_endpoint = token_endpoint;
        self.tokeninfo_endpoint = tokeninfo_endpoint;
        self
    }

    /// Exchange a one-time authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<OAuthTokens> {
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose().as_str()),
                ("redirect_uri", REDIRECT_URI),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::TokenExchange(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))?;

        debug!(
            has_refresh_token = token.refresh_token.is_some(),
            "authorization code exchanged"
        );
        Ok(OAuthTokens::from_response(token, now_millis()))
    }

    /// Refresh `tokens` in place using their refresh token.
    ///
    /// Keeps the previous refresh token when the endpoint does not rotate it.
    pub async fn refresh(&self, tokens: &mut OAuthTokens) -> Result<()> {
        let refresh = tokens
            .refresh_token
            .clone()
            .ok_or_else(|| Error::TokenRefresh("no refresh token available".into()))?;

        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose().as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::TokenRefresh(format!("token refresh request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::TokenRefresh(format!(
                "token refresh returned {status}: {body}"
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::TokenRefresh(format!("invalid refresh response: {e}")))?;

        tokens.access_token = token.access_token;
        if let Some(rotated) = token.refresh_token {
            tokens.refresh_token = Some(rotated);
        }
        tokens.expires_at = expiry_from(token.expires_in, now_millis());
        debug!("access token refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> GoogleOAuthClient {
        GoogleOAuthClient::new(
            reqwest::Client::new(),
            "client-123.apps.googleusercontent.com".into(),
            Secret::new("shh".to_string()),
        )
        .with_endpoints(
            format!("{}/token", server.uri()),
            format!("{}/tokeninfo", server.uri()),
        )
    }

    #[test]
    fn token_response_deserializes_without_refresh_token() {
        let json = r#"{"access_token":"ya29.abc","expires_in":3599,"token_type":"Bearer"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "ya29.abc");
        assert!(token.refresh_token.is_none());
        assert_eq!(token.expires_in, Some(3599));
    }

    #[test]
    fn tokens_compute_absolute_expiry() {
        let response = TokenResponse {
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            expires_in: Some(60),
        };
        let tokens = OAuthTokens::from_response(response, 1_000);
        assert_eq!(tokens.expires_at, 61_000);
        assert!(!tokens.is_expired(60_999));
        assert!(tokens.is_expired(61_000));
    }

    #[test]
    fn unknown_expiry_never_expires_locally() {
        let tokens = OAuthTokens {
            access_token: "at".into(),
            refresh_token: None,
            expires_at: 0,
        };
        assert!(!tokens.is_expired(u64::MAX));
    }

    #[test]
    fn debug_redacts_tokens() {
        let tokens = OAuthTokens {
            access_token: "ya29.secret".into(),
            refresh_token: Some("1//refresh".into()),
            expires_at: 5,
        };
        let debug = format!("{tokens:?}");
        assert!(!debug.contains("ya29.secret"));
        assert!(!debug.contains("1//refresh"));
    }

    #[test]
    fn exchange_uses_postmessage_redirect() {
        assert_eq!(REDIRECT_URI, "postmessage");
        assert_eq!(TOKEN_ENDPOINT, "https://oauth2.googleapis.com/token");
    }

    #[tokio::test]
    async fn exchange_code_posts_authorization_code_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=4%2Fone-time"))
            .and(body_string_contains("redirect_uri=postmessage"))
            .and(body_string_contains("client_secret=shh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.fresh",
                "refresh_token": "1//rt",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = test_client(&server)
            .exchange_code("4/one-time")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "ya29.fresh");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//rt"));
        assert!(tokens.expires_at > 0);
    }

    #[tokio::test]
    async fn exchange_code_rejects_invalid_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({ "error": "invalid_grant" })),
            )
            .mount(&server)
            .await;

        let err = test_client(&server)
            .exchange_code("used-code")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TokenExchange(_)), "got: {err:?}");
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn refresh_keeps_refresh_token_when_not_rotated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=1%2F%2Frt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.second",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut tokens = OAuthTokens {
            access_token: "ya29.first".into(),
            refresh_token: Some("1//rt".into()),
            expires_at: 1,
        };
        test_client(&server).refresh(&mut tokens).await.unwrap();
        assert_eq!(tokens.access_token, "ya29.second");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//rt"));
        assert!(tokens.expires_at > 1);
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_fails_offline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut tokens = OAuthTokens {
            access_token: "ya29.first".into(),
            refresh_token: None,
            expires_at: 1,
        };
        let err = test_client(&server).refresh(&mut tokens).await.unwrap_err();
        assert!(matches!(err, Error::TokenRefresh(_)));
    }

    #[tokio::test]
    async fn refresh_rejected_by_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("revoked"))
            .mount(&server)
            .await;

        let mut tokens = OAuthTokens {
            access_token: "ya29.first".into(),
            refresh_token: Some("1//rt".into()),
            expires_at: 1,
        };
        let err = test_client(&server).refresh(&mut tokens).await.unwrap_err();
        assert!(matches!(err, Error::TokenRefresh(_)));
        assert_eq!(tokens.access_token, "ya29.first");
    }
}
