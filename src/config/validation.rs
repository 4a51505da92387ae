//! Configuration validation

use super::*;
use crate::error::{NotesError, Result};
use secrecy::ExposeSecret;

const LOG_FORMATS: &[&str] = &["json", "compact", "pretty"];

pub const MAX_REQUEST_TIMEOUT_SECS: u64 = 3600;
pub const MAX_TOKEN_LIFETIME_MINS: i64 = 60 * 24 * 365;
pub const MAX_IDLE_WINDOW_SECS: u64 = 86_400;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server_config(&config.server)?;
    validate_auth_settings(&config.auth)?;
    validate_rate_limit_settings(&config.rate_limit)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validate server configuration
fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.port == 0 {
        return Err(NotesError::Config("Server port must be greater than 0".to_string()));
    }

    if config.request_timeout_secs == 0 || config.request_timeout_secs > MAX_REQUEST_TIMEOUT_SECS {
        return Err(NotesError::Config(format!(
            "Request timeout must be between 1 and {} seconds",
            MAX_REQUEST_TIMEOUT_SECS
        )));
    }

    if config.env == PRODUCTION_ENV && config.allowed_origins.trim().is_empty() {
        return Err(NotesError::Config(
            "Allowed origins are required in production".to_string(),
        ));
    }

    Ok(())
}

/// Validate credential settings
fn validate_auth_settings(config: &AuthSettings) -> Result<()> {
    if config.jwt_secret.expose_secret().is_empty() {
        return Err(NotesError::Config("JWT secret is required".to_string()));
    }

    if config.token_lifetime_mins <= 0 || config.token_lifetime_mins > MAX_TOKEN_LIFETIME_MINS {
        return Err(NotesError::Config(format!(
            "Token lifetime must be between 1 and {} minutes",
            MAX_TOKEN_LIFETIME_MINS
        )));
    }

    if config.cookie_name.is_empty() {
        return Err(NotesError::Config("Cookie name cannot be empty".to_string()));
    }

    if !(4..=31).contains(&config.bcrypt_cost) {
        return Err(NotesError::Config(format!(
            "bcrypt cost must be between 4 and 31, got {}",
            config.bcrypt_cost
        )));
    }

    Ok(())
}

/// Validate admission control settings
fn validate_rate_limit_settings(config: &RateLimitSettings) -> Result<()> {
    if !config.rate_per_sec.is_finite() || config.rate_per_sec <= 0.0 {
        return Err(NotesError::Config("Rate must be a positive number".to_string()));
    }

    if config.burst == 0 {
        return Err(NotesError::Config("Burst must be greater than 0".to_string()));
    }

    if config.idle_window_secs == 0 || config.idle_window_secs > MAX_IDLE_WINDOW_SECS {
        return Err(NotesError::Config(format!(
            "Idle window must be between 1 and {} seconds",
            MAX_IDLE_WINDOW_SECS
        )));
    }

    Ok(())
}

fn validate_logging_config(config: &LoggingConfig) -> Result<()> {
    if !LOG_FORMATS.contains(&config.format.as_str()) {
        return Err(NotesError::Config(format!(
            "Invalid log format: {} (must be one of: {})",
            config.format,
            LOG_FORMATS.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default_config();
        config.auth.jwt_secret = Secret::new("test_secret".to_string());
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(validate_config(&Config::default_config()).is_err());
    }

    #[test]
    fn test_rate_limit_bounds() {
        let mut config = valid_config();
        config.rate_limit.rate_per_sec = 0.0;
        assert!(validate_config(&config).is_err());

        let mut config = valid_config();
        config.rate_limit.burst = 0;
        assert!(validate_config(&config).is_err());

        let mut config = valid_config();
        config.rate_limit.idle_window_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_tiny_rate_is_accepted() {
        let mut config = valid_config();
        config.rate_limit.rate_per_sec = 1e-20;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_durations_have_upper_bounds() {
        let mut config = valid_config();
        config.server.request_timeout_secs = u64::MAX;
        assert!(validate_config(&config).is_err());
        config.server.request_timeout_secs = MAX_REQUEST_TIMEOUT_SECS;
        assert!(validate_config(&config).is_ok());

        let mut config = valid_config();
        config.auth.token_lifetime_mins = i64::MAX;
        assert!(validate_config(&config).is_err());
        config.auth.token_lifetime_mins = MAX_TOKEN_LIFETIME_MINS;
        assert!(validate_config(&config).is_ok());
        let _ = config.auth_config();

        let mut config = valid_config();
        config.rate_limit.idle_window_secs = u64::MAX;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_production_requires_origins() {
        let mut config = valid_config();
        config.server.env = PRODUCTION_ENV.to_string();
        assert!(validate_config(&config).is_err());

        config.server.allowed_origins = "https://notes.example".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_log_format() {
        let mut config = valid_config();
        config.logging.format = "xml".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_bcrypt_cost_bounds() {
        let mut config = valid_config();
        config.auth.bcrypt_cost = 3;
        assert!(validate_config(&config).is_err());
    }
}
