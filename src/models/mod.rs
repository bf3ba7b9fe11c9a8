//! Data models for replay steps, responses and results.
//!
//! This module contains the core data structures exchanged between the
//! replay engine and its collaborators: the step templates a recorder or
//! importer supplies, the normalized responses a transport produces, and the
//! per-step results and progress events the engine emits.

pub mod response;
pub mod result;
pub mod step;

pub use response::{ContentType, NormalizedResponse};
pub use result::{ProgressEvent, ProgressStatus, StepResult, StepStatus};
pub use step::{
    body_payload, Capture, CaptureSource, Step, Substitution, SubstitutionMode,
    OPENAPI_EXAMPLE_POINTERS,
};
