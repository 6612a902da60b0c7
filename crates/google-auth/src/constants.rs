//! Google OAuth constants
//!
//! Public endpoint configuration for the Google identity provider. The client
//! id and secret are per-deployment and come from the service configuration.

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Token introspection endpoint reporting the subject and audience of an access token
pub const TOKENINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v1/tokeninfo";

/// Redirect URI for codes obtained by the JavaScript sign-in button.
///
/// Codes minted for a `postmessage` client never travel through a redirect,
/// so the exchange must present this literal value instead of a URL.
pub const REDIRECT_URI: &str = "postmessage";
