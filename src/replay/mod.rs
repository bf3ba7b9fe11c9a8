//! Replay orchestration.
//!
//! A [`ReplaySession`] owns everything one replay needs: the executor, the
//! session's [`VariableStore`] and its run status. Steps run strictly in
//! order; each goes through substitution, execution, capture and
//! classification, and produces exactly one [`StepResult`].
//!
//! Two modes share the same runner:
//! - [`ReplaySession::replay`] runs to completion (or an early stop) and
//!   returns the results
//! - [`ReplaySession::replay_with_tracking`] additionally reports every state
//!   transition to a [`ProgressSink`]
//!
//! A run can be stopped from elsewhere through a [`StopHandle`]. The flag is
//! checked between steps, so a request already in flight always completes.

pub mod progress;

pub use progress::{NoProgress, ProgressSink, StoreProgressSink};

use crate::executor::{RequestExecutor, Transport};
use crate::models::{
    Capture, NormalizedResponse, ProgressEvent, ProgressStatus, Step, StepResult, StepStatus,
};
use crate::variables::{apply_substitutions, capture, CaptureOutcome, VariableStore};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Options controlling one replay run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplayOptions {
    /// Halt after the first step whose status is `error`.
    pub stop_on_error: bool,

    /// Treat any successful capture as a step error. Used to assert that a
    /// variable no longer appears in a response.
    pub error_on_capture: bool,

    /// Capture rules appended to every step.
    pub global_variables: Vec<Capture>,

    /// Rebase every step URL onto this origin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Pause between consecutive executed steps, in milliseconds.
    #[serde(alias = "stepInterval", skip_serializing_if = "Option::is_none")]
    pub step_interval_ms: Option<u64>,
}

/// Lifecycle of a replay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Idle,
    Running,
    Completed,
    Stopped,
}

/// Cloneable handle that asks a running replay to stop before its next step.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Has no effect on a request already in flight.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// One replay session: executor, variables and run state.
///
/// Runs take `&mut self`, so a session can never execute two runs at once.
pub struct ReplaySession<T> {
    id: Uuid,
    executor: RequestExecutor<T>,
    variables: VariableStore,
    status: SessionStatus,
    stop: StopHandle,
}

impl<T: Transport> ReplaySession<T> {
    /// Creates an idle session with an empty variable store.
    pub fn new(executor: RequestExecutor<T>) -> Self {
        Self::with_variables(executor, VariableStore::new())
    }

    /// Creates an idle session seeded with existing variables.
    pub fn with_variables(executor: RequestExecutor<T>, variables: VariableStore) -> Self {
        Self {
            id: Uuid::new_v4(),
            executor,
            variables,
            status: SessionStatus::Idle,
            stop: StopHandle::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    pub fn into_variables(self) -> VariableStore {
        self.variables
    }

    pub fn executor(&self) -> &RequestExecutor<T> {
        &self.executor
    }

    /// Returns a handle that can stop this session's runs from another task.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Runs `steps` and returns one result per executed or skipped step.
    ///
    /// The result list is shorter than `steps` only when the run halted
    /// early, either through `stop_on_error` or a stop request.
    pub async fn replay(&mut self, steps: &[Step], options: &ReplayOptions) -> Vec<StepResult> {
        self.run(steps, options, &mut NoProgress).await
    }

    /// Runs `steps` like [`replay`](Self::replay), reporting each state
    /// transition to `sink`.
    ///
    /// Every executed step emits `in-progress` followed by its final status;
    /// skipped steps emit `skipped`. The run ends with an event at index -1
    /// whose status is `complete`, or `stopped` after a stop request.
    pub async fn replay_with_tracking<S>(
        &mut self,
        steps: &[Step],
        options: &ReplayOptions,
        sink: &mut S,
    ) -> Vec<StepResult>
    where
        S: ProgressSink + ?Sized,
    {
        self.run(steps, options, sink).await
    }

    async fn run<S>(
        &mut self,
        steps: &[Step],
        options: &ReplayOptions,
        sink: &mut S,
    ) -> Vec<StepResult>
    where
        S: ProgressSink + ?Sized,
    {
        self.stop.reset();
        self.status = SessionStatus::Running;

        let steps = prepare_steps(steps, options);
        let interval = options
            .step_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        info!(
            "Session {}: replaying {} step(s) (stopOnError={}, errorOnCapture={})",
            self.id,
            steps.len(),
            options.stop_on_error,
            options.error_on_capture
        );

        let mut results = Vec::with_capacity(steps.len());
        let mut stopped = false;

        for (index, step) in steps.iter().enumerate() {
            if self.stop.is_stopped() {
                info!("Session {}: stop requested before step {}", self.id, index);
                stopped = true;
                break;
            }

            if step.skip {
                debug!("Skipping step {} '{}'", index, step.name);
                let result = StepResult::skipped(step.name.clone());
                sink.on_progress(ProgressEvent::from_result(index, &result));
                results.push(result);
                continue;
            }

            let result = self.run_step(index, step, options, sink).await;
            sink.on_progress(ProgressEvent::from_result(index, &result));

            let halt = result.is_error() && options.stop_on_error;
            results.push(result);

            if halt {
                info!(
                    "Session {}: stopping after error in step {}",
                    self.id, index
                );
                break;
            }

            if let Some(interval) = interval {
                if index + 1 < steps.len() {
                    tokio::time::sleep(interval).await;
                }
            }
        }

        let (status, final_status) = if stopped {
            (SessionStatus::Stopped, ProgressStatus::Stopped)
        } else {
            (SessionStatus::Completed, ProgressStatus::Complete)
        };
        self.status = status;
        sink.on_progress(ProgressEvent::new(-1, final_status));

        info!(
            "Session {}: {} result(s), {} error(s)",
            self.id,
            results.len(),
            results.iter().filter(|r| r.is_error()).count()
        );

        results
    }

    async fn run_step<S>(
        &mut self,
        index: usize,
        step: &Step,
        options: &ReplayOptions,
        sink: &mut S,
    ) -> StepResult
    where
        S: ProgressSink + ?Sized,
    {
        let processed = apply_substitutions(step, &self.variables);

        let mut event = ProgressEvent::new(index as i64, ProgressStatus::InProgress);
        event.request = Some(processed.clone());
        sink.on_progress(event);

        debug!(
            "Step {} '{}': {} {}",
            index, step.name, processed.method, processed.url
        );

        let response = match self.executor.execute(&processed).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Step {} '{}' failed: {}", index, step.name, e);
                return StepResult {
                    step: step.name.clone(),
                    status: StepStatus::Error,
                    request: Some(processed),
                    response: None,
                    captured_variables: Default::default(),
                    error: Some(e.to_string()),
                };
            }
        };

        let outcome = capture(&response, &processed.variable_captures, &mut self.variables);
        let error = classify(&response, &outcome, options);

        StepResult {
            step: step.name.clone(),
            status: if error.is_some() {
                StepStatus::Error
            } else {
                StepStatus::Success
            },
            request: Some(processed),
            response: Some(response),
            captured_variables: outcome.captured,
            error,
        }
    }
}

/// Decides whether an executed step failed, returning the diagnostic.
///
/// Checked in order: HTTP status of 300 or more, any capture when
/// `error_on_capture` is set, then missing required captures.
pub fn classify(
    response: &NormalizedResponse,
    outcome: &CaptureOutcome,
    options: &ReplayOptions,
) -> Option<String> {
    if response.is_http_error() {
        return Some(format!(
            "HTTP error: {} {}",
            response.status, response.status_text
        ));
    }

    if options.error_on_capture {
        if let Some(message) = outcome.captured_message() {
            return Some(message);
        }
    }

    outcome.missing_message()
}

/// Applies run options to a copy of `steps`: disabled steps become skipped,
/// URLs are rebased onto `base_url`, and global capture rules are appended.
pub fn prepare_steps(steps: &[Step], options: &ReplayOptions) -> Vec<Step> {
    let base_url = options
        .base_url
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty());

    steps
        .iter()
        .map(|step| {
            let mut prepared = step.clone();

            if !prepared.enabled {
                prepared.skip = true;
            }

            if let Some(base) = base_url {
                prepared.url = apply_base_url(&prepared.url, base);
            }

            prepared
                .variable_captures
                .extend(options.global_variables.iter().cloned().map(|mut rule| {
                    rule.is_global = true;
                    rule
                }));

            prepared
        })
        .collect()
}

/// Replaces the scheme, host and port of `url` with those of `base`,
/// keeping path, query and fragment verbatim. Relative URLs are appended to
/// the base origin.
///
/// A base without a scheme is treated as `http://`. An unusable base
/// leaves the URL unchanged.
///
/// # Examples
///
/// ```
/// use request_replay::replay::apply_base_url;
///
/// assert_eq!(
///     apply_base_url("https://prod.example.com/api/users?page=2", "localhost:8080"),
///     "http://localhost:8080/api/users?page=2"
/// );
/// assert_eq!(
///     apply_base_url("/api/users/${id}", "https://staging.example.com"),
///     "https://staging.example.com/api/users/${id}"
/// );
/// ```
pub fn apply_base_url(url: &str, base: &str) -> String {
    if url.is_empty() {
        return String::new();
    }

    let Some(origin) = origin_of(base) else {
        warn!("Invalid base URL '{}', keeping {}", base, url);
        return url.to_string();
    };

    let rest = match url.find("://") {
        Some(scheme_end) => {
            let after_scheme = &url[scheme_end + 3..];
            match after_scheme.find(|c| c == '/' || c == '?' || c == '#') {
                Some(pos) => &after_scheme[pos..],
                None => "",
            }
        }
        None => url,
    };

    let rebased = if rest.is_empty() {
        format!("{}/", origin)
    } else if rest.starts_with('/') || rest.starts_with('?') || rest.starts_with('#') {
        format!("{}{}", origin, rest)
    } else {
        format!("{}/{}", origin, rest)
    };

    debug!("Applied base URL: {} -> {}", url, rebased);
    rebased
}

/// Returns the most frequent origin among the step URLs.
///
/// URLs without a scheme are read as `http://`. Ties go to the origin that
/// reached the highest count first.
pub fn common_base_url(steps: &[Step]) -> Option<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut best: Option<(usize, usize)> = None;

    for origin in steps.iter().filter_map(|s| origin_of(&s.url)) {
        let position = match counts.iter().position(|(o, _)| *o == origin) {
            Some(position) => {
                counts[position].1 += 1;
                position
            }
            None => {
                counts.push((origin, 1));
                counts.len() - 1
            }
        };

        let count = counts[position].1;
        if best.map_or(true, |(_, max)| count > max) {
            best = Some((position, count));
        }
    }

    best.map(|(position, _)| counts[position].0.clone())
}

/// Serialized origin of an http(s) URL, adding `http://` when no scheme is
/// present.
fn origin_of(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    let lower = url.to_ascii_lowercase();
    let with_scheme = if lower.starts_with("http://") || lower.starts_with("https://") {
        url.to_string()
    } else if url.contains("://") {
        return None;
    } else {
        format!("http://{}", url)
    };

    let parsed = url::Url::parse(&with_scheme).ok()?;
    parsed.host_str()?;
    Some(parsed.origin().ascii_serialization())
}
