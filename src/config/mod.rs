//! Configuration management
//!
//! This module handles loading and parsing configuration for the relay.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults. The frontend and
//! backend URLs have no defaults; their absence is reported per request by
//! [`RelayConfig::targets`].

use axum::http::HeaderValue;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Environment variable naming the frontend base URL
pub const FRONTEND_URL_VAR: &str = "RELAY_FRONTEND_URL";
/// Environment variable naming the backend base URL
pub const BACKEND_URL_VAR: &str = "RELAY_BACKEND_URL";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Relay configuration
    #[serde(default)]
    pub relay: RelayConfig,
    /// Thumbnail cache configuration
    #[serde(default)]
    pub thumbnail_cache: ThumbnailCacheConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

/// Deployment environment the relay runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development (default)
    #[default]
    Development,
    /// Preview deployment
    Preview,
    /// Production deployment
    Production,
}

impl std::str::FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "local" => Ok(Self::Development),
            "preview" => Ok(Self::Preview),
            "production" => Ok(Self::Production),
            _ => Err(()),
        }
    }
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Frontend base URL, the fallback `Access-Control-Allow-Origin`
    #[serde(default)]
    pub frontend_url: Option<String>,
    /// Backend origin requests are forwarded to
    #[serde(default)]
    pub backend_url: Option<String>,
    /// Deployment environment
    #[serde(default)]
    pub environment: Environment,
    /// Always answer with the frontend URL, ignoring the request origin.
    /// When unset, this is on in production only.
    #[serde(default)]
    pub force_frontend_origin: Option<bool>,
    /// Origins echoed back verbatim (glob patterns with `*` and `?`)
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Header name prefixes added by the hosting platform, never forwarded
    #[serde(default = "default_platform_header_prefixes")]
    pub platform_header_prefixes: Vec<String>,
    /// Path prefix of the thumbnail sub-route
    #[serde(default = "default_thumbnail_prefix")]
    pub thumbnail_prefix: String,
    /// Timeout for one backend round trip
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum inbound body size buffered for forwarding
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            frontend_url: None,
            backend_url: None,
            environment: Environment::default(),
            force_frontend_origin: None,
            allowed_origins: default_allowed_origins(),
            platform_header_prefixes: default_platform_header_prefixes(),
            thumbnail_prefix: default_thumbnail_prefix(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "https://blogcast.app".to_string(),
        "https://www.blogcast.app".to_string(),
        "https://blogcast.vercel.app".to_string(),
        "http://localhost:*".to_string(),
        "http://127.0.0.1:*".to_string(),
    ]
}

fn default_platform_header_prefixes() -> Vec<String> {
    vec!["x-vercel-".to_string()]
}

fn default_thumbnail_prefix() -> String {
    "/api/blogs/thumbnail".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024 // 10MB
}

/// Validated frontend/backend pair a relay invocation works against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    /// Frontend URL without a trailing slash, ready to be sent as an origin
    pub frontend_origin: HeaderValue,
    /// Backend base URL
    pub backend_url: Url,
    /// Backend `host[:port]` for the outbound `Host` header
    pub backend_host: HeaderValue,
}

impl Targets {
    /// Backend URL for an inbound path and optional query string.
    ///
    /// The path is appended as-is, so `/api/...` stays `/api/...` on the backend.
    pub fn backend_target(&self, path_and_query: &str) -> String {
        let base = self.backend_url.as_str().trim_end_matches('/');
        format!("{}{}", base, path_and_query)
    }
}

impl RelayConfig {
    /// Whether the configured frontend URL is used regardless of the request origin
    pub fn forces_frontend_origin(&self) -> bool {
        self.force_frontend_origin
            .unwrap_or(self.environment == Environment::Production)
    }

    /// Validate the frontend/backend pair.
    ///
    /// Called for every relay invocation before any method dispatch so a
    /// misconfigured deployment answers every request with the same error.
    pub fn targets(&self) -> Result<Targets, ConfigError> {
        let frontend_url = required(&self.frontend_url, FRONTEND_URL_VAR)?;
        let backend_raw = required(&self.backend_url, BACKEND_URL_VAR)?;

        let backend_url = Url::parse(backend_raw).map_err(|e| ConfigError::Invalid {
            name: BACKEND_URL_VAR,
            message: e.to_string(),
        })?;
        if !matches!(backend_url.scheme(), "http" | "https") || backend_url.host_str().is_none() {
            return Err(ConfigError::Invalid {
                name: BACKEND_URL_VAR,
                message: format!("expected an absolute http(s) URL, got '{}'", backend_raw),
            });
        }

        let frontend_origin = HeaderValue::from_str(frontend_url.trim_end_matches('/'))
            .map_err(|e| ConfigError::Invalid {
                name: FRONTEND_URL_VAR,
                message: e.to_string(),
            })?;

        let host = backend_url.host_str().unwrap_or_default();
        let host = match backend_url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let backend_host = HeaderValue::from_str(&host).map_err(|e| ConfigError::Invalid {
            name: BACKEND_URL_VAR,
            message: e.to_string(),
        })?;

        Ok(Targets {
            frontend_origin,
            backend_url,
            backend_host,
        })
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

/// Thumbnail cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailCacheConfig {
    /// Whether successful thumbnail responses are cached
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Maximum number of cached thumbnails
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Largest thumbnail body kept in the cache; bigger ones are only streamed
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,
    /// Time-to-live of a cached thumbnail in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for ThumbnailCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_entries: default_max_entries(),
            max_entry_bytes: default_max_entry_bytes(),
            ttl_seconds: default_cache_ttl(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_max_entries() -> u64 {
    1000
}

fn default_max_entry_bytes() -> u64 {
    256 * 1024
}

fn default_cache_ttl() -> u64 {
    86400
}

/// Error type for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration for {name}: {message}")]
    Invalid {
        name: &'static str,
        message: String,
    },
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist or is empty, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables:
    /// - RELAY_SERVER_HOST
    /// - RELAY_SERVER_PORT
    /// - RELAY_FRONTEND_URL
    /// - RELAY_BACKEND_URL
    /// - RELAY_ENVIRONMENT
    /// - RELAY_FORCE_FRONTEND_ORIGIN
    /// - RELAY_ALLOWED_ORIGINS (comma separated)
    /// - RELAY_REQUEST_TIMEOUT_SECS
    /// - RELAY_THUMBNAIL_CACHE_ENABLED
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("RELAY_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("RELAY_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        // Relay configuration
        if let Ok(url) = std::env::var(FRONTEND_URL_VAR) {
            self.relay.frontend_url = Some(url);
        }
        if let Ok(url) = std::env::var(BACKEND_URL_VAR) {
            self.relay.backend_url = Some(url);
        }
        if let Ok(env) = std::env::var("RELAY_ENVIRONMENT") {
            if let Ok(env) = env.parse::<Environment>() {
                self.relay.environment = env;
            }
        }
        if let Ok(force) = std::env::var("RELAY_FORCE_FRONTEND_ORIGIN") {
            if let Some(force) = parse_bool(&force) {
                self.relay.force_frontend_origin = Some(force);
            }
        }
        if let Ok(origins) = std::env::var("RELAY_ALLOWED_ORIGINS") {
            let origins: Vec<String> = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if !origins.is_empty() {
                self.relay.allowed_origins = origins;
            }
        }
        if let Ok(timeout) = std::env::var("RELAY_REQUEST_TIMEOUT_SECS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.relay.request_timeout_secs = timeout;
            }
        }

        // Thumbnail cache configuration
        if let Ok(enabled) = std::env::var("RELAY_THUMBNAIL_CACHE_ENABLED") {
            if let Some(enabled) = parse_bool(&enabled) {
                self.thumbnail_cache.enabled = enabled;
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
