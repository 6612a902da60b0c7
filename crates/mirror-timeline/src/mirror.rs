//! Mirror API client
//!
//! Sends timeline writes with the user's bearer token. An expired token is
//! refreshed before the call; a 401 answer triggers one refresh and one retry.
//! If no refresh is possible the call fails with `TimelineError::RefreshFailed`.

use std::future::Future;
use std::pin::Pin;

use google_auth::{GoogleOAuthClient, OAuthTokens, now_millis};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::payload::{Contact, Subscription, TimelineItem};
use crate::{Result, Timeline, TimelineError};

/// Default API root for the Mirror API.
pub const DEFAULT_API_URL: &str = "https://www.googleapis.com/mirror/v1";

/// HTTP timeline client for the Mirror API.
#[derive(Clone)]
pub struct MirrorClient {
    http: reqwest::Client,
    api_url: String,
    oauth: GoogleOAuthClient,
}

impl MirrorClient {
    /// Create a client rooted at `api_url` that refreshes tokens through `oauth`.
    pub fn new(http: reqwest::Client, api_url: String, oauth: GoogleOAuthClient) -> Self {
        Self {
            http,
            api_url,
            oauth,
        }
    }

    async fn insert<T: Serialize + Sync>(
        &self,
        tokens: &mut OAuthTokens,
        collection: &str,
        body: &T,
    ) -> Result<serde_json::Value> {
        if tokens.is_expired(now_millis()) {
            debug!(collection, "access token expired, refreshing before call");
            self.refresh(tokens).await?;
        }

        let mut response = self.post(collection, &tokens.access_token, body).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(collection, "access token rejected, refreshing and retrying");
            self.refresh(tokens).await?;
            response = self.post(collection, &tokens.access_token, body).await?;
        }

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(TimelineError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| TimelineError::Http(format!("invalid {collection} response: {e}")))
    }

    async fn post<T: Serialize + Sync>(
        &self,
        collection: &str,
        access_token: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/{collection}", self.api_url.trim_end_matches('/'));
        self.http
            .post(&url)
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| TimelineError::Http(format!("{collection} insert failed: {e}")))
    }

    async fn refresh(&self, tokens: &mut OAuthTokens) -> Result<()> {
        self.oauth.refresh(tokens).await.map_err(|e| {
            warn!(error = %e, "timeline token refresh failed");
            TimelineError::RefreshFailed(e.to_string())
        })
    }
}

impl Timeline for MirrorClient {
    fn insert_contact<'a>(
        &'a self,
        tokens: &'a mut OAuthTokens,
        contact: &'a Contact,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(self.insert(tokens, "contacts", contact))
    }

    fn insert_subscription<'a>(
        &'a self,
        tokens: &'a mut OAuthTokens,
        subscription: &'a Subscription,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(self.insert(tokens, "subscriptions", subscription))
    }

    fn insert_item<'a>(
        &'a self,
        tokens: &'a mut OAuthTokens,
        item: &'a TimelineItem,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>> {
        Box::pin(self.insert(tokens, "timeline", item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer) -> MirrorClient {
        let oauth = GoogleOAuthClient::new(
            reqwest::Client::new(),
            "client-123".into(),
            Secret::new("shh".to_string()),
        )
        .with_endpoints(
            format!("{}/token", server.uri()),
            format!("{}/tokeninfo", server.uri()),
        );
        MirrorClient::new(
            reqwest::Client::new(),
            format!("{}/mirror/v1", server.uri()),
            oauth,
        )
    }

    fn tokens(refresh: Option<&str>) -> OAuthTokens {
        OAuthTokens {
            access_token: "ya29.first".into(),
            refresh_token: refresh.map(String::from),
            expires_at: 0,
        }
    }

    #[tokio::test]
    async fn insert_contact_sends_bearer_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mirror/v1/contacts"))
            .and(header("authorization", "Bearer ya29.first"))
            .and(body_partial_json(serde_json::json!({ "id": "instaglass_sepia" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "kind": "mirror#contact" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut tokens = tokens(None);
        let result = test_client(&server)
            .insert_contact(&mut tokens, &Contact::sepia())
            .await
            .unwrap();
        assert_eq!(result["kind"], "mirror#contact");
    }

    #[tokio::test]
    async fn unauthorized_call_refreshes_and_retries_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mirror/v1/timeline"))
            .and(header("authorization", "Bearer ya29.first"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.second",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mirror/v1/timeline"))
            .and(header("authorization", "Bearer ya29.second"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "item-1" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut tokens = tokens(Some("1//rt"));
        let result = test_client(&server)
            .insert_item(&mut tokens, &TimelineItem::welcome())
            .await
            .unwrap();

        assert_eq!(result["id"], "item-1");
        assert_eq!(tokens.access_token, "ya29.second");
        assert_eq!(tokens.refresh_token.as_deref(), Some("1//rt"));
    }

    #[tokio::test]
    async fn unauthorized_without_refresh_token_is_refresh_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mirror/v1/subscriptions"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let mut tokens = tokens(None);
        let sub = Subscription::timeline_updates("108", "vt", "https://glass.example.com");
        let err = test_client(&server)
            .insert_subscription(&mut tokens, &sub)
            .await
            .unwrap_err();
        assert!(matches!(err, TimelineError::RefreshFailed(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_before_the_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "ya29.second",
                "expires_in": 3600,
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/mirror/v1/contacts"))
            .and(header("authorization", "Bearer ya29.second"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let mut tokens = OAuthTokens {
            access_token: "ya29.first".into(),
            refresh_token: Some("1//rt".into()),
            expires_at: 1,
        };
        test_client(&server)
            .insert_contact(&mut tokens, &Contact::sepia())
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "ya29.second");
    }

    #[tokio::test]
    async fn server_error_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mirror/v1/contacts"))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
            .mount(&server)
            .await;

        let mut tokens = tokens(Some("1//rt"));
        let err = test_client(&server)
            .insert_contact(&mut tokens, &Contact::sepia())
            .await
            .unwrap_err();
        match err {
            TimelineError::Api { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "backend unavailable");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
