//! HTTP request execution configuration.
//!
//! This module defines the options that control how replayed requests are
//! prepared and sent, and the retry policy of the reduced-fidelity fallback.

use crate::config::get_config;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded retry policy, expressed as data.
///
/// Attempt `n` (0-based) waits `delay_ms * backoff_factor^(n-1)` before
/// running; the first attempt runs immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Must be at least 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,

    /// Multiplier applied to the delay after each failed retry.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_max_attempts() -> u32 {
    1
}

fn default_backoff_factor() -> f64 {
    1.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: 0,
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn once() -> Self {
        Self::default()
    }

    /// Creates a policy with exponential backoff.
    pub fn new(max_attempts: u32, delay_ms: u64, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            delay_ms,
            backoff_factor,
        }
    }

    /// Delay to wait before the given 0-based attempt.
    ///
    /// # Examples
    ///
    /// ```
    /// use request_replay::executor::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::new(4, 100, 2.0);
    /// assert_eq!(policy.delay_before(0), Duration::ZERO);
    /// assert_eq!(policy.delay_before(1), Duration::from_millis(100));
    /// assert_eq!(policy.delay_before(3), Duration::from_millis(400));
    /// ```
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.delay_ms == 0 {
            return Duration::ZERO;
        }

        let factor = self.backoff_factor.max(1.0).powi(attempt as i32 - 1);
        Duration::from_millis((self.delay_ms as f64 * factor).round() as u64)
    }
}

/// Configuration for preparing and sending replayed requests.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    /// Per-request timeout.
    pub timeout: Duration,

    pub follow_redirects: bool,

    pub max_redirects: u32,

    pub validate_ssl: bool,

    /// Header names removed before sending, compared case-insensitively.
    pub stripped_headers: Vec<String>,

    /// Marker header added to every request unless the step already sets it.
    pub source_header: Option<(String, String)>,

    /// Largest non-text body, in bytes, inlined as text.
    pub binary_inline_limit: usize,

    /// Policy for the reduced-fidelity GET/HEAD retry.
    pub fallback_retry: RetryPolicy,
}

impl ExecutionConfig {
    /// Creates an ExecutionConfig from the global replay configuration.
    pub fn from_global_config() -> Self {
        let global_config = get_config();
        Self {
            timeout: global_config.timeout_duration(),
            follow_redirects: global_config.follow_redirects,
            max_redirects: global_config.max_redirects,
            validate_ssl: global_config.validate_ssl,
            source_header: global_config.source_header(),
            stripped_headers: global_config.stripped_headers,
            binary_inline_limit: global_config.binary_inline_limit,
            fallback_retry: global_config.fallback_retry,
        }
    }

    /// Returns true if `name` is one of the stripped headers.
    pub fn is_stripped(&self, name: &str) -> bool {
        self.stripped_headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case(name))
    }
}

impl Default for ExecutionConfig {
    /// Creates a default ExecutionConfig using global configuration.
    fn default() -> Self {
        Self::from_global_config()
    }
}
