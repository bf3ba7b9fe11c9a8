//! Integration tests module for the replay engine
//!
//! This module provides common utilities and test infrastructure
//! for running full replays against mock HTTP servers.

pub mod openapi_replay_test;
pub mod replay_end_to_end_test;

use request_replay::executor::{ExecutionConfig, RequestExecutor, ReqwestTransport, RetryPolicy};
use request_replay::replay::ReplaySession;
use std::sync::Once;
use std::time::Duration;

static INIT: Once = Once::new();

/// Initialize test environment (run once)
pub fn init_test_env() {
    INIT.call_once(|| {
        // RUST_LOG controls verbosity; output goes through the test harness
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Execution settings used by every integration test.
pub fn test_config() -> ExecutionConfig {
    ExecutionConfig {
        timeout: Duration::from_secs(5),
        follow_redirects: true,
        max_redirects: 10,
        validate_ssl: true,
        stripped_headers: vec![
            "origin".to_string(),
            "referer".to_string(),
            "host".to_string(),
            "connection".to_string(),
            "content-length".to_string(),
        ],
        source_header: Some(("X-Request-Source".to_string(), "request-replay".to_string())),
        binary_inline_limit: 10_000,
        fallback_retry: RetryPolicy::once(),
    }
}

/// A fresh session over a real reqwest transport.
pub fn live_session() -> ReplaySession<ReqwestTransport> {
    init_test_env();
    let config = test_config();
    let transport = ReqwestTransport::new(&config).expect("Failed to build transport");
    ReplaySession::new(RequestExecutor::new(transport, config))
}
