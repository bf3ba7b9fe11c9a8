//! Capture engine for extracting variables from HTTP responses.
//!
//! Each [`Capture`] rule selects a source text from the response (body,
//! headers or final URL), runs its regex once against it and stores capture
//! group 1 under the rule's name.
//!
//! # Examples
//!
//! ```
//! use request_replay::models::{Capture, NormalizedResponse};
//! use request_replay::variables::{capture, VariableStore};
//! use serde_json::json;
//!
//! let response = NormalizedResponse::new(200, "OK", json!({"token": "abc123"}));
//! let rules = vec![Capture::new("token", r#""token":"([^"]+)""#)];
//! let mut variables = VariableStore::new();
//!
//! let outcome = capture(&response, &rules, &mut variables);
//! assert_eq!(outcome.captured["token"].as_text(), "abc123");
//! assert_eq!(variables.get("token").unwrap().as_text(), "abc123");
//! ```

use super::{VariableStore, VariableValue};
use crate::models::{Capture, CaptureSource, NormalizedResponse};
use log::{debug, warn};
use regex::Regex;
use std::collections::BTreeMap;

/// A required capture rule that did not capture anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingCapture {
    pub name: String,
    pub regex: String,
}

/// Result of running a step's capture rules against its response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureOutcome {
    /// Variables captured by this step, by name.
    pub captured: BTreeMap<String, VariableValue>,

    /// Required rules that did not capture, in rule order.
    pub missing_required: Vec<MissingCapture>,
}

impl CaptureOutcome {
    /// Diagnostic listing every missing required variable, or `None` if all
    /// required rules captured.
    pub fn missing_message(&self) -> Option<String> {
        if self.missing_required.is_empty() {
            return None;
        }

        let missing: Vec<String> = self
            .missing_required
            .iter()
            .map(|m| format!("{} (regex: {})", m.name, m.regex))
            .collect();

        Some(format!(
            "Required variable(s) not captured: {}",
            missing.join(", ")
        ))
    }

    /// Diagnostic listing every captured name/value pair, or `None` if
    /// nothing was captured.
    pub fn captured_message(&self) -> Option<String> {
        if self.captured.is_empty() {
            return None;
        }

        let pairs: Vec<String> = self
            .captured
            .iter()
            .map(|(name, value)| format!("{} = \"{}\"", name, value))
            .collect();

        Some(format!("Error captured variable : {}", pairs.join(", ")))
    }
}

/// Runs every rule against `response`, writing captured values into
/// `variables` as they are found.
///
/// Rules are evaluated in order and later rules see values written by
/// earlier ones. A rule with an invalid regex is logged and treated as not
/// captured. Rules without a name or regex are ignored.
pub fn capture(
    response: &NormalizedResponse,
    rules: &[Capture],
    variables: &mut VariableStore,
) -> CaptureOutcome {
    let mut outcome = CaptureOutcome::default();

    if rules.is_empty() {
        return outcome;
    }

    debug!("Processing {} capture rule(s)", rules.len());

    for rule in rules {
        if !rule.is_well_formed() {
            debug!("Skipping capture rule without name or regex: {:?}", rule);
            continue;
        }

        match extract(response, rule) {
            Some(value) => {
                debug!("Captured variable {} = {}", rule.name, value);
                let value = VariableValue::Text(value);
                variables.set(rule.name.clone(), value.clone());
                outcome.captured.insert(rule.name.clone(), value);
            }
            None if rule.required => {
                debug!("Required variable {} not captured", rule.name);
                outcome.missing_required.push(MissingCapture {
                    name: rule.name.clone(),
                    regex: rule.regex.clone(),
                });
            }
            None => {}
        }
    }

    outcome
}

/// Returns capture group 1 of the first match of the rule's regex.
///
/// A missing or empty group counts as not captured.
fn extract(response: &NormalizedResponse, rule: &Capture) -> Option<String> {
    let regex = match Regex::new(&rule.regex) {
        Ok(regex) => regex,
        Err(e) => {
            warn!("Invalid capture regex for {}: {}", rule.name, e);
            return None;
        }
    };

    let text = source_text(response, rule.source);

    let value = regex
        .captures(&text)?
        .get(1)
        .map(|m| m.as_str().to_string())
        .filter(|v| !v.is_empty());

    if value.is_none() {
        debug!(
            "Pattern for {} matched no capture group in {:?}",
            rule.name, rule.source
        );
    }

    value
}

fn source_text(response: &NormalizedResponse, source: CaptureSource) -> String {
    match source {
        CaptureSource::Body => response.body_text(),
        CaptureSource::Headers => response.headers_text(),
        CaptureSource::Url => response.url.clone().unwrap_or_default(),
    }
}
