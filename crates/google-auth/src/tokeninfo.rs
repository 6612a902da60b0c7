//! Access token introspection
//!
//! The tokeninfo endpoint reports who a token was issued for (`user_id`) and
//! which OAuth client it was issued to (`issued_to`). Invalid or expired
//! tokens come back as HTTP 400 with an `error` member, which is surfaced
//! verbatim so callers can relay it. Any other non-success answer, or a body
//! lacking either field, is an `Error::Http`.

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::token::GoogleOAuthClient;

/// Fields of a tokeninfo response used for identity and audience checks.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TokenInfo {
    /// Subject the token was issued for
    pub user_id: String,
    /// OAuth client the token was issued to
    pub issued_to: String,
}

impl GoogleOAuthClient {
    /// Look up the subject and audience of `access_token`.
    pub async fn token_info(&self, access_token: &str) -> Result<TokenInfo> {
        let response = self
            .http
            .get(&self.tokeninfo_endpoint)
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| Error::Http(format!("tokeninfo request failed: {e}")))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("tokeninfo returned {status} with invalid body: {e}")))?;

        parse_token_info(status, body)
    }
}

/// Split a tokeninfo answer into the provider's error payload, a transport-level
/// failure, or a `TokenInfo`.
fn parse_token_info(status: reqwest::StatusCode, body: serde_json::Value) -> Result<TokenInfo> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        return Err(Error::Introspection(error.clone()));
    }
    if !status.is_success() {
        return Err(Error::Http(format!("tokeninfo returned {status}: {body}")));
    }

    let info: TokenInfo = serde_json::from_value(body)
        .map_err(|e| Error::Http(format!("unexpected tokeninfo shape: {e}")))?;
    debug!(issued_to = ?info.issued_to, "token introspected");
    Ok(info)
}
