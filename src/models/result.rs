//! Replay results and progress events.

use super::{NormalizedResponse, Step};
use crate::variables::VariableValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Final outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Error,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Error => "error",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution trace of one step, produced in step order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    /// Name of the step this result belongs to.
    pub step: String,

    pub status: StepStatus,

    /// The step after substitution, as it was sent. Absent for skipped steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Step>,

    /// The normalized response, when one was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<NormalizedResponse>,

    /// Variables captured by this step.
    #[serde(default)]
    pub captured_variables: BTreeMap<String, VariableValue>,

    /// Diagnostic for error results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// Creates the record for a skipped step.
    pub fn skipped(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Skipped,
            request: None,
            response: None,
            captured_variables: BTreeMap::new(),
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == StepStatus::Error
    }
}

/// State reported in a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    InProgress,
    Success,
    Error,
    Skipped,
    /// The session ran to its end (possibly halted by stop-on-error).
    Complete,
    /// The session was stopped on request.
    Stopped,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::InProgress => "in-progress",
            ProgressStatus::Success => "success",
            ProgressStatus::Error => "error",
            ProgressStatus::Skipped => "skipped",
            ProgressStatus::Complete => "complete",
            ProgressStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<StepStatus> for ProgressStatus {
    fn from(status: StepStatus) -> Self {
        match status {
            StepStatus::Success => ProgressStatus::Success,
            StepStatus::Error => ProgressStatus::Error,
            StepStatus::Skipped => ProgressStatus::Skipped,
        }
    }
}

/// Notification emitted by a tracked replay after each state transition.
///
/// Session end is marked by an event with `step_index == -1` and status
/// `complete` or `stopped`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub step_index: i64,
    pub status: ProgressStatus,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<NormalizedResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_variables: Option<BTreeMap<String, VariableValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    /// Creates an event stamped with the current time.
    pub fn new(step_index: i64, status: ProgressStatus) -> Self {
        Self {
            step_index,
            status,
            timestamp: chrono::Utc::now().timestamp_millis(),
            request: None,
            response: None,
            captured_variables: None,
            error: None,
        }
    }

    /// Creates the event mirroring a finished step result.
    pub fn from_result(step_index: usize, result: &StepResult) -> Self {
        let mut event = Self::new(step_index as i64, result.status.into());
        event.request = result.request.clone();
        event.response = result.response.clone();
        if result.status != StepStatus::Skipped {
            event.captured_variables = Some(result.captured_variables.clone());
        }
        event.error = result.error.clone();
        event
    }

    /// Returns true for the session-end marker.
    pub fn is_terminal(&self) -> bool {
        self.step_index < 0
    }
}
