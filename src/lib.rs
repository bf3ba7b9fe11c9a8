//! Request Replay
//!
//! Replays recorded sequences of HTTP requests, carrying values from one
//! response into later requests.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - **models**: Steps, substitution and capture rules, responses, results
//! - **variables**: Variable store, substitution engine, JSON patcher and
//!   capture engine
//! - **executor**: Turns processed steps into HTTP requests through a
//!   pluggable transport
//! - **replay**: Replay sessions, batch and tracked runs
//! - **openapi**: Step import from OpenAPI documents and raw recordings
//! - **storage**: Key-value persistence for progress and variables
//! - **config**: Global replay configuration
//!
//! # Replay flow
//!
//! For every step, in order:
//! 1. Substitution rules and `${name}` placeholders rewrite URL, headers and
//!    body using the variables captured so far
//! 2. The executor sends the request and normalizes the response
//! 3. Capture rules extract new variables from the response
//! 4. The step is classified as success or error
//!
//! # Usage
//!
//! ```no_run
//! use request_replay::models::{Capture, Step, Substitution};
//! use request_replay::replay::{ReplayOptions, ReplaySession};
//! use request_replay::executor::RequestExecutor;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let steps = vec![
//!     Step::new("login", "POST", "https://api.example.com/login")
//!         .with_body(json!({"user": "alice", "password": "secret"}))
//!         .with_capture(Capture::new("token", r#""token":"([^"]+)""#).required()),
//!     Step::new("profile", "GET", "https://api.example.com/me")
//!         .with_header("Authorization", "Bearer TOKEN")
//!         .with_substitution(Substitution::variable("TOKEN", "token")),
//! ];
//!
//! let mut session = ReplaySession::new(RequestExecutor::from_global_config()?);
//! for result in session.replay(&steps, &ReplayOptions::default()).await {
//!     println!("{}: {}", result.step, result.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod models;
pub mod openapi;
pub mod replay;
pub mod storage;
pub mod variables;

pub use executor::{RequestError, RequestExecutor, ReqwestTransport, Transport};
pub use models::{
    Capture, NormalizedResponse, ProgressEvent, Step, StepResult, StepStatus, Substitution,
};
pub use replay::{ReplayOptions, ReplaySession, StopHandle};
pub use variables::VariableStore;
