//! Variables module for the replay engine
//!
//! This module owns everything that moves values between steps: the
//! session [`VariableStore`], the substitution engine that rewrites a step
//! before it is sent, the structure-aware JSON patcher it relies on, and the
//! capture engine that extracts values from responses.

pub mod capture;
#[cfg(test)]
pub(crate) mod log_capture;
pub mod patcher;
pub mod store;
pub mod substitution;

pub use capture::{capture, CaptureOutcome, MissingCapture};
pub use patcher::{patch, FieldHint};
pub use store::{VariableStore, VariableValue};
pub use substitution::{
    apply_substitutions, replace_placeholders, resolve_replacement, substitute_text,
    MISSING_VARIABLE_DEFAULT,
};
