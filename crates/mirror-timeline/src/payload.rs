//! Request bodies for the timeline API
//!
//! Field names follow the Mirror API's camelCase JSON. The constructors
//! build the fixed payloads sent when a user connects.

use serde::{Deserialize, Serialize};

/// Image shown for the sepia contact and attached to the welcome item.
pub const SEPIA_IMAGE_URL: &str = "https://mirror-api.appspot.com/images/sepia.jpg";

/// Path appended to the service base URL for subscription callbacks.
pub const TIMELINE_UPDATE_PATH: &str = "/timeline_update";

/// A contact that timeline items can be shared with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: String,
    pub display_name: String,
    pub image_urls: Vec<String>,
    pub accept_types: Vec<String>,
}

impl Contact {
    /// The sepia filter contact registered for every new user.
    pub fn sepia() -> Self {
        Self {
            id: "instaglass_sepia".into(),
            display_name: "Sepia".into(),
            image_urls: vec![SEPIA_IMAGE_URL.into()],
            accept_types: vec!["image/*".into()],
        }
    }
}

/// Operation a subscription is notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Update,
}

/// A push-notification subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub collection: String,
    pub operation: Operation,
    /// Echoed back in notifications to identify the user
    pub user_token: String,
    /// Echoed back in notifications to authenticate the sender
    pub verify_token: String,
    pub callback_url: String,
}

impl Subscription {
    /// Subscribe to updates of `user_token`'s timeline, delivered under `base_url`.
    pub fn timeline_updates(user_token: &str, verify_token: &str, base_url: &str) -> Self {
        Self {
            collection: "timeline".into(),
            operation: Operation::Update,
            user_token: user_token.into(),
            verify_token: verify_token.into(),
            callback_url: callback_url(base_url),
        }
    }
}

/// Callback URL for timeline notifications under `base_url`.
pub fn callback_url(base_url: &str) -> String {
    format!("{}{TIMELINE_UPDATE_PATH}", base_url.trim_end_matches('/'))
}

/// Media attached to a timeline item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    pub content_url: String,
}

/// A card on the user's timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineItem {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl TimelineItem {
    /// Welcome card showing the sepia contact's image.
    pub fn welcome() -> Self {
        Self {
            text: "Welcome to Instaglass!".into(),
            attachments: vec![Attachment {
                content_type: "image/jpeg".into(),
                content_url: SEPIA_IMAGE_URL.into(),
            }],
        }
    }
}
