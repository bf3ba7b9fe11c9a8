//! Configuration schema for the replay engine.
//!
//! This module defines the configuration structure and validation logic for
//! all user-configurable settings of the replay engine and its HTTP
//! transport.

use crate::executor::config::RetryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when a configuration fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A setting holds a value outside its allowed range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure for the replay engine.
///
/// All settings are read from the "replay" key of a JSON settings document.
/// Missing settings fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayConfig {
    /// Request timeout in milliseconds.
    ///
    /// Enforced by the transport, never by the orchestrator. Defaults to
    /// 30000ms. Must be greater than 0.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Whether to automatically follow HTTP redirects. Defaults to true.
    #[serde(default = "default_follow_redirects")]
    pub follow_redirects: bool,

    /// Maximum number of redirects to follow when `follow_redirects` is set.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,

    /// Whether to validate SSL/TLS certificates. Defaults to true.
    ///
    /// **Warning:** Disabling SSL validation can expose you to security risks.
    #[serde(default = "default_validate_ssl", alias = "validateSSL")]
    pub validate_ssl: bool,

    /// Headers removed (case-insensitively) from every replayed request.
    #[serde(default = "default_stripped_headers")]
    pub stripped_headers: Vec<String>,

    /// Marker header added to every replayed request, as `"Name: value"`.
    ///
    /// `None` disables the marker.
    #[serde(default = "default_request_source_header")]
    pub request_source_header: Option<String>,

    /// Largest binary body, in bytes, inlined as text in a normalized
    /// response. Larger bodies are replaced by a placeholder.
    #[serde(default = "default_binary_inline_limit")]
    pub binary_inline_limit: usize,

    /// Retry policy for the reduced-fidelity GET/HEAD fallback.
    #[serde(default)]
    pub fallback_retry: RetryPolicy,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            follow_redirects: default_follow_redirects(),
            max_redirects: default_max_redirects(),
            validate_ssl: default_validate_ssl(),
            stripped_headers: default_stripped_headers(),
            request_source_header: default_request_source_header(),
            binary_inline_limit: default_binary_inline_limit(),
            fallback_retry: RetryPolicy::default(),
        }
    }
}

impl ReplayConfig {
    /// Validates the configuration and returns an error for the first
    /// invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout == 0 {
            return Err(ConfigError::Invalid(
                "timeout must be greater than 0".to_string(),
            ));
        }

        if self.fallback_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "fallbackRetry.maxAttempts must be greater than 0".to_string(),
            ));
        }

        if self.fallback_retry.backoff_factor < 1.0 {
            return Err(ConfigError::Invalid(
                "fallbackRetry.backoffFactor must be at least 1.0".to_string(),
            ));
        }

        if let Some(header) = &self.request_source_header {
            if parse_header_line(header).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "requestSourceHeader must look like 'Name: value', got '{}'",
                    header
                )));
            }
        }

        Ok(())
    }

    /// Returns the timeout as a `std::time::Duration`.
    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout)
    }

    /// Returns the request source header split into name and value.
    pub fn source_header(&self) -> Option<(String, String)> {
        self.request_source_header
            .as_deref()
            .and_then(parse_header_line)
    }
}

/// Splits `"Name: value"` into its trimmed parts.
fn parse_header_line(line: &str) -> Option<(String, String)> {
    let (name, value) = line.split_once(':')?;
    let name = name.trim();
    if name.is_empty() || name.contains(char::is_whitespace) {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

// Default value functions for serde

fn default_timeout() -> u64 {
    30000
}

fn default_follow_redirects() -> bool {
    true
}

fn default_max_redirects() -> u32 {
    10
}

fn default_validate_ssl() -> bool {
    true
}

fn default_stripped_headers() -> Vec<String> {
    ["origin", "referer", "host", "connection", "content-length"]
        .iter()
        .map(|h| h.to_string())
        .collect()
}

fn default_request_source_header() -> Option<String> {
    Some("X-Request-Source: request-replay".to_string())
}

fn default_binary_inline_limit() -> usize {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = ReplayConfig::default();
        assert_eq!(config.timeout, 30000);
        assert!(config.follow_redirects);
        assert_eq!(config.max_redirects, 10);
        assert!(config.validate_ssl);
        assert_eq!(config.stripped_headers.len(), 5);
        assert_eq!(config.binary_inline_limit, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: ReplayConfig = serde_json::from_value(json!({
            "timeout": 5000,
            "strippedHeaders": ["origin"]
        }))
        .unwrap();

        assert_eq!(config.timeout, 5000);
        assert_eq!(config.stripped_headers, vec!["origin".to_string()]);
        assert_eq!(config.fallback_retry, RetryPolicy::default());
        assert_eq!(
            config.source_header(),
            Some(("X-Request-Source".to_string(), "request-replay".to_string()))
        );
    }

    #[test]
    fn test_source_header_can_be_disabled() {
        let config: ReplayConfig =
            serde_json::from_value(json!({"requestSourceHeader": null})).unwrap();
        assert!(config.source_header().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_timeout() {
        let config = ReplayConfig {
            timeout: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "Invalid configuration: timeout must be greater than 0"
        );
    }

    #[test]
    fn test_validate_retry_policy() {
        let mut config = ReplayConfig::default();
        config.fallback_retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = ReplayConfig::default();
        config.fallback_retry.backoff_factor = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_source_header_format() {
        let config = ReplayConfig {
            request_source_header: Some("no colon here".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_duration() {
        let config = ReplayConfig {
            timeout: 1500,
            ..Default::default()
        };
        assert_eq!(
            config.timeout_duration(),
            std::time::Duration::from_millis(1500)
        );
    }
}
