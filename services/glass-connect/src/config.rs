//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The OAuth client secret is loaded from GOOGLE_CLIENT_SECRET or
//! client_secret_file, never stored in the TOML directly to avoid leaking it.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub mirror: MirrorConfig,
    pub storage: StorageConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Public URL of this service, used to build subscription callback URLs
    pub base_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Idle lifetime of a browser session
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

/// Google OAuth client settings
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to GOOGLE_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default = "default_tokeninfo_endpoint")]
    pub tokeninfo_endpoint: String,
    /// Timeout for every outbound call (token, tokeninfo, timeline)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Timeline API settings
#[derive(Debug, Deserialize)]
pub struct MirrorConfig {
    /// Base URL handed to the consent page for API discovery
    #[serde(default = "default_discovery_url")]
    pub discovery_url: String,
    /// API root for timeline writes; defaults to `{discovery_url}/mirror/v1`
    #[serde(default)]
    pub api_url: Option<String>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            discovery_url: default_discovery_url(),
            api_url: None,
        }
    }
}

impl MirrorConfig {
    /// Resolved API root for timeline writes.
    pub fn api_url(&self) -> String {
        self.api_url.clone().unwrap_or_else(|| {
            format!("{}/mirror/v1", self.discovery_url.trim_end_matches('/'))
        })
    }
}

/// Credential persistence settings
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub credentials_path: PathBuf,
}

fn default_max_connections() -> usize {
    1000
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_timeout() -> u64 {
    30
}

fn default_token_endpoint() -> String {
    google_auth::TOKEN_ENDPOINT.to_string()
}

fn default_tokeninfo_endpoint() -> String {
    google_auth::TOKENINFO_ENDPOINT.to_string()
}

fn default_discovery_url() -> String {
    "https://www.googleapis.com".to_string()
}

fn require_http_url(name: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{name} must start with http:// or https://, got: {value}"
        )))
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. GOOGLE_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Ok(secret) = std::env::var("GOOGLE_CLIENT_SECRET") {
            config.oauth.client_secret = Secret::from_trimmed(&secret);
        } else if let Some(ref secret_file) = config.oauth.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            config.oauth.client_secret = Secret::from_trimmed(&secret);
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        require_http_url("base_url", &self.server.base_url)?;
        require_http_url("token_endpoint", &self.oauth.token_endpoint)?;
        require_http_url("tokeninfo_endpoint", &self.oauth.tokeninfo_endpoint)?;
        require_http_url("discovery_url", &self.mirror.discovery_url)?;
        if let Some(ref api_url) = self.mirror.api_url {
            require_http_url("api_url", api_url)?;
        }

        if self.oauth.client_id.trim().is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }

        if self.oauth.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.server.session_ttl_secs == 0 {
            return Err(common::Error::Config(
                "session_ttl_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("glass-connect.toml")
    }
}
