//! Timeline API abstraction for linking a Glass user
//!
//! Defines the `Timeline` trait the connect handshake uses for its three
//! downstream writes (contact, subscription, welcome item), the payloads it
//! sends, and `MirrorClient`, the HTTP implementation against the Mirror API.
//!
//! Every call takes the user's tokens mutably: an implementation may refresh
//! them mid-call, and the caller persists whatever tokens it holds once all
//! calls succeed.

pub mod mirror;
pub mod payload;

pub use mirror::MirrorClient;
pub use payload::{Attachment, Contact, Operation, Subscription, TimelineItem};

use google_auth::OAuthTokens;
use std::future::Future;
use std::pin::Pin;

/// Errors from timeline API calls.
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    /// The access token was rejected and could not be refreshed.
    #[error("failed to refresh access token: {0}")]
    RefreshFailed(String),

    #[error("timeline request failed: {0}")]
    Http(String),

    #[error("timeline API returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Result alias for timeline operations.
pub type Result<T> = std::result::Result<T, TimelineError>;

/// Write operations against a user's timeline.
///
/// None of these calls is idempotent; callers must not retry them blindly.
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Timeline>`).
pub trait Timeline: Send + Sync {
    /// Register a contact the user can share timeline items with.
    fn insert_contact<'a>(
        &'a self,
        tokens: &'a mut OAuthTokens,
        contact: &'a Contact,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;

    /// Subscribe to notifications about the user's timeline.
    fn insert_subscription<'a>(
        &'a self,
        tokens: &'a mut OAuthTokens,
        subscription: &'a Subscription,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;

    /// Insert an item into the user's timeline.
    fn insert_item<'a>(
        &'a self,
        tokens: &'a mut OAuthTokens,
        item: &'a TimelineItem,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value>> + Send + 'a>>;
}
