use crate::config::types::{Config, CrawlerConfig, OutputConfig, RateLimitConfig, SessionConfig};
use crate::ConfigError;
use reqwest::header::HeaderName;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_session_config(&config.session)?;
    validate_crawler_config(&config.crawler)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates session configuration
fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            config.base_url
        )));
    }

    if HeaderName::from_bytes(config.auth_header.as_bytes()).is_err() {
        return Err(ConfigError::Validation(format!(
            "auth_header '{}' is not a valid HTTP header name",
            config.auth_header
        )));
    }

    if config.timeout_secs < 1 || config.timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "timeout_secs must be between 1 and 300, got {}",
            config.timeout_secs
        )));
    }

    if config.login_markers.iter().any(|m| m.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "login_markers cannot contain empty entries".to_string(),
        ));
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if !config.listing_path.starts_with('/') || !config.listing_path.contains("{user}") {
        return Err(ConfigError::Validation(format!(
            "listing_path must start with '/' and contain '{{user}}', got '{}'",
            config.listing_path
        )));
    }

    if config.page_size < 1 || config.page_size > 100 {
        return Err(ConfigError::Validation(format!(
            "page_size must be between 1 and 100, got {}",
            config.page_size
        )));
    }

    if config.failure_threshold < 1 {
        return Err(ConfigError::Validation(
            "failure_threshold must be >= 1".to_string(),
        ));
    }

    if config.max_pages == Some(0) {
        return Err(ConfigError::Validation(
            "max_pages must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates pacing configuration
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.request_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "request_delay_ms ({}) cannot exceed max_delay_ms ({})",
            config.request_delay_ms, config.max_delay_ms
        )));
    }

    if config.reset_after_successes < 1 {
        return Err(ConfigError::Validation(
            "reset_after_successes must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
