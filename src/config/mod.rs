//! Configuration management for the notes service

use secrecy::Secret;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::middleware::{AuthConfig, CorsPolicy, EvictionPolicy, RateLimitConfig};

pub mod loader;
pub mod validation;

/// Execution mode that turns on strict origin enforcement
pub const PRODUCTION_ENV: &str = "production";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Execution mode; `production` enables origin enforcement
    #[serde(default = "default_env")]
    pub env: String,

    /// Comma-separated origin allow-list
    #[serde(default)]
    pub allowed_origins: String,

    /// Per-request deadline in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Path prefix of the API documentation UI
    #[serde(default = "default_docs_path")]
    pub docs_path: String,
}

/// Credential and session cookie settings
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// HMAC secret for signing credentials
    #[serde(default = "default_secret", deserialize_with = "deserialize_secret")]
    pub jwt_secret: Secret<String>,

    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    #[serde(default = "default_token_lifetime")]
    pub token_lifetime_mins: i64,

    #[serde(default = "default_cookie_max_age")]
    pub cookie_max_age_secs: u64,

    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
}

/// Admission control settings
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_rate_per_sec")]
    pub rate_per_sec: f64,

    #[serde(default = "default_burst")]
    pub burst: u32,

    #[serde(default = "default_idle_window")]
    pub idle_window_secs: u64,

    #[serde(default)]
    pub eviction: EvictionPolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// `json`, `compact` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_server_host() -> String { "0.0.0.0".to_string() }
fn default_server_port() -> u16 { 8025 }
fn default_env() -> String { "local".to_string() }
fn default_request_timeout() -> u64 { 20 }
fn default_docs_path() -> String { "/swagger/".to_string() }
fn default_secret() -> Secret<String> { Secret::new(String::new()) }
fn default_cookie_name() -> String { crate::middleware::auth::DEFAULT_COOKIE_NAME.to_string() }
fn default_token_lifetime() -> i64 { 60 }
fn default_cookie_max_age() -> u64 { 309_600 }
fn default_bcrypt_cost() -> u32 { bcrypt::DEFAULT_COST }
fn default_rate_per_sec() -> f64 { 5.0 }
fn default_burst() -> u32 { 10 }
fn default_idle_window() -> u64 { 300 } // 5 minutes
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            env: default_env(),
            allowed_origins: String::new(),
            request_timeout_secs: default_request_timeout(),
            docs_path: default_docs_path(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: default_secret(),
            cookie_name: default_cookie_name(),
            token_lifetime_mins: default_token_lifetime(),
            cookie_max_age_secs: default_cookie_max_age(),
            bcrypt_cost: default_bcrypt_cost(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            rate_per_sec: default_rate_per_sec(),
            burst: default_burst(),
            idle_window_secs: default_idle_window(),
            eviction: EvictionPolicy::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file with environment
    /// variable overrides
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let config = loader::load_config_with_env(path)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Validate this configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        validation::validate_config(self)
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthSettings::default(),
            rate_limit: RateLimitSettings::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.server.env == PRODUCTION_ENV
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            rate_per_sec: self.rate_limit.rate_per_sec,
            burst: self.rate_limit.burst,
            idle_window: Duration::from_secs(self.rate_limit.idle_window_secs),
            eviction: self.rate_limit.eviction,
        }
    }

    pub fn auth_config(&self) -> AuthConfig {
        AuthConfig {
            secret: self.auth.jwt_secret.clone(),
            token_lifetime: chrono::Duration::minutes(self.auth.token_lifetime_mins),
            cookie_name: self.auth.cookie_name.clone(),
            cookie_max_age_secs: self.auth.cookie_max_age_secs,
        }
    }

    pub fn cors_policy(&self) -> CorsPolicy {
        CorsPolicy::new(&self.server.allowed_origins, self.is_production(), self.server.docs_path.clone())
    }
}

/// Custom deserializer for Secret<String>
fn deserialize_secret<'de, D>(deserializer: D) -> Result<Secret<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(Secret::new(s))
}
