//! Configuration module for recbridge.
//!
//! Typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and environment overrides for the
//! secrets that should not live on disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Environment variable overriding `auth.jwt_secret`
pub const ENV_JWT_SECRET: &str = "RECBRIDGE_JWT_SECRET";

/// Environment variable overriding `auth.webhook_api_key`
pub const ENV_WEBHOOK_API_KEY: &str = "RECBRIDGE_WEBHOOK_API_KEY";

/// Top-level configuration for recbridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Upstream transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the default upstream instance (tenants may override).
    pub url: String,
    /// Timeout for authentication calls, in seconds.
    pub auth_timeout_secs: u64,
    /// Timeout for read-family operations, in seconds.
    pub read_timeout_secs: u64,
    /// Timeout for write-family operations, in seconds.
    pub write_timeout_secs: u64,
    /// Retries on transient transport errors.
    pub transport_retries: u32,
    /// Initial transport backoff in milliseconds (doubles per retry).
    pub initial_backoff_ms: u64,
}

/// Local store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the SQLite database backing the cache and tenant directory.
    pub path: PathBuf,
    /// Optional URL of an external cache backend. When unset, the SQLite
    /// store serves the cache port.
    #[serde(default)]
    pub cache_url: Option<String>,
}

/// Bearer-token and webhook authentication settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing key for bearer tokens. Overridable via
    /// `RECBRIDGE_JWT_SECRET`.
    pub jwt_secret: String,
    /// Shared API key accepted by the webhook receiver. Overridable via
    /// `RECBRIDGE_WEBHOOK_API_KEY`.
    pub webhook_api_key: String,
}

/// Per-tenant request budgets by window class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Window length in seconds.
    pub window_secs: u64,
    pub read_per_window: u64,
    pub write_per_window: u64,
    pub batch_per_window: u64,
}

/// Sync plane settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Whether pulled events are acknowledged upstream.
    pub ack_after_pull: bool,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Emit JSON log lines instead of the human-readable format.
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8400,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth_timeout_secs: 15,
            read_timeout_secs: 30,
            write_timeout_secs: 60,
            transport_retries: 2,
            initial_backoff_ms: 300,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("recbridge.db"),
            cache_url: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 60,
            read_per_window: 100,
            write_per_window: 50,
            batch_per_window: 10,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ack_after_pull: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// A single configuration validation failure.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|_| {
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        })
    }

    /// Default configuration file path (`$XDG_CONFIG_HOME/recbridge/config.yaml`).
    pub fn default_path() -> PathBuf {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("recbridge")
            .join("config.yaml")
    }

    /// Pull secrets from the environment when present.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secret) = std::env::var(ENV_JWT_SECRET) {
            if !secret.is_empty() {
                self.auth.jwt_secret = secret;
            }
        }
        if let Ok(key) = std::env::var(ENV_WEBHOOK_API_KEY) {
            if !key.is_empty() {
                self.auth.webhook_api_key = key;
            }
        }
    }

    /// Validate the configuration, returning every problem found.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.upstream.url.is_empty() {
            errors.push(ValidationError {
                field: "upstream.url".into(),
                message: "upstream base URL is required".into(),
            });
        } else if !self.upstream.url.starts_with("http://")
            && !self.upstream.url.starts_with("https://")
        {
            errors.push(ValidationError {
                field: "upstream.url".into(),
                message: "must start with http:// or https://".into(),
            });
        }

        if self.auth.jwt_secret.is_empty() {
            errors.push(ValidationError {
                field: "auth.jwt_secret".into(),
                message: format!("required (set in config or via {ENV_JWT_SECRET})"),
            });
        }

        if self.upstream.transport_retries > 10 {
            errors.push(ValidationError {
                field: "upstream.transport_retries".into(),
                message: "unreasonably high; maximum is 10".into(),
            });
        }

        if self.rate_limit.enabled && self.rate_limit.window_secs == 0 {
            errors.push(ValidationError {
                field: "rate_limit.window_secs".into(),
                message: "must be positive when rate limiting is enabled".into(),
            });
        }

        let level = self.logging.level.as_str();
        if !["trace", "debug", "info", "warn", "error"].contains(&level) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!("unknown level '{level}'"),
            });
        }

        errors
    }
}
