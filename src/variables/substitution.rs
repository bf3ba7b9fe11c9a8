//! Variable substitution engine.
//!
//! Rewrites a step before execution: the URL, then every header value, then
//! the body. Each substitution rule replaces all matches of its regex with a
//! fixed value or with a variable from the [`VariableStore`]. After the
//! rules, `${name}` placeholders are filled from the store.
//!
//! Structured (object/array) bodies are first handed to the
//! [smart JSON patcher](super::patcher); only when the patcher finds nothing
//! to change is the rule applied to the serialized JSON, and the result is
//! kept only if it still parses.
//!
//! Nothing in here fails a step. Invalid regexes and bodies that stop being
//! valid JSON are logged and skipped.

use super::{patcher, VariableStore};
use crate::models::{Step, Substitution, SubstitutionMode, OPENAPI_EXAMPLE_POINTERS};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use serde_json::Value as JsonValue;

/// Value used when a variable-mode rule references an unknown variable.
pub const MISSING_VARIABLE_DEFAULT: &str = "0";

/// Cached regex pattern for matching ${variableName} placeholders.
static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("Failed to compile placeholder regex"));

/// Applies a step's substitution rules and placeholders, returning the
/// processed copy. The input step is never modified.
///
/// # Examples
///
/// ```
/// use request_replay::models::{Step, Substitution};
/// use request_replay::variables::{apply_substitutions, VariableStore};
///
/// let mut variables = VariableStore::new();
/// variables.set("token", "abc123");
///
/// let step = Step::new("profile", "GET", "https://api.example.com/me?t=OLD")
///     .with_substitution(Substitution::variable("OLD", "token"));
///
/// let processed = apply_substitutions(&step, &variables);
/// assert_eq!(processed.url, "https://api.example.com/me?t=abc123");
/// assert_eq!(step.url, "https://api.example.com/me?t=OLD");
/// ```
pub fn apply_substitutions(step: &Step, variables: &VariableStore) -> Step {
    let mut processed = step.clone();
    let rules = &step.variable_substitutions;

    debug!(
        "Substituting step '{}' with {} rule(s), {} variable(s) available",
        step.name,
        rules.len(),
        variables.len()
    );

    let url = substitute_text(&processed.url, rules, variables);
    if url != processed.url {
        debug!("URL modified: {} -> {}", processed.url, url);
        processed.url = url;
    }

    for (name, value) in processed.request_headers.iter_mut() {
        let substituted = substitute_text(value, rules, variables);
        if substituted != *value {
            debug!("Header '{}' modified: {} -> {}", name, value, substituted);
            *value = substituted;
        }
    }

    match processed.request_body.as_mut() {
        Some(JsonValue::String(text)) => {
            *text = substitute_text(text, rules, variables);
        }
        Some(body) if body.is_object() || body.is_array() => {
            substitute_structured_body(body, rules, variables);
        }
        _ => {}
    }

    processed
}

/// Resolves the replacement text for a rule.
///
/// Returns `None` when the rule has no regex or resolves to an empty value,
/// which makes it a no-op. Variable-mode rules referencing an unknown
/// variable resolve to [`MISSING_VARIABLE_DEFAULT`].
pub fn resolve_replacement(rule: &Substitution, variables: &VariableStore) -> Option<String> {
    if rule.regex.is_empty() {
        debug!("Skipping substitution with no regex pattern");
        return None;
    }

    let fixed = rule
        .value
        .as_deref()
        .filter(|v| rule.mode == SubstitutionMode::Fixed && !v.is_empty());

    let replacement = if let Some(value) = fixed {
        value.to_string()
    } else if let Some(name) = rule.target_variable.as_deref().filter(|n| !n.is_empty()) {
        match variables.get(name) {
            Some(value) => value.as_text(),
            None => {
                debug!(
                    "Variable '{}' not captured yet, using default {}",
                    name, MISSING_VARIABLE_DEFAULT
                );
                MISSING_VARIABLE_DEFAULT.to_string()
            }
        }
    } else {
        return None;
    };

    Some(replacement).filter(|r| !r.is_empty())
}

/// Applies every rule globally to `text`, then fills `${name}` placeholders.
pub fn substitute_text(text: &str, rules: &[Substitution], variables: &VariableStore) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut result = text.to_string();

    for rule in rules {
        let Some(replacement) = resolve_replacement(rule, variables) else {
            continue;
        };

        let Some(regex) = compile_rule(rule) else {
            continue;
        };

        let replaced = regex.replace_all(&result, NoExpand(&replacement));
        if replaced != result.as_str() {
            debug!("Applied substitution: {} -> {}", rule.regex, replacement);
            result = replaced.into_owned();
        } else {
            debug!("No matches found for pattern: {}", rule.regex);
        }
    }

    replace_placeholders(&result, variables)
}

/// Replaces `${name}` with the stored value of `name`.
///
/// Unknown or empty variables leave the placeholder untouched.
///
/// # Examples
///
/// ```
/// use request_replay::variables::{replace_placeholders, VariableStore};
///
/// let mut variables = VariableStore::new();
/// variables.set("id", "42");
///
/// assert_eq!(replace_placeholders("/users/${id}/${other}", &variables), "/users/42/${other}");
/// ```
pub fn replace_placeholders(text: &str, variables: &VariableStore) -> String {
    if !text.contains("${") {
        return text.to_string();
    }

    PLACEHOLDER_REGEX
        .replace_all(text, |caps: &regex::Captures| {
            match variables.get(&caps[1]).filter(|v| !v.is_empty()) {
                Some(value) => value.as_text(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn compile_rule(rule: &Substitution) -> Option<Regex> {
    match Regex::new(&rule.regex) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("Invalid substitution regex '{}': {}", rule.regex, e);
            None
        }
    }
}

/// Substitutes inside a structured body, looking through an OpenAPI
/// request-body envelope when present.
fn substitute_structured_body(
    body: &mut JsonValue,
    rules: &[Substitution],
    variables: &VariableStore,
) {
    for pointer in OPENAPI_EXAMPLE_POINTERS {
        if let Some(example) = body.pointer_mut(pointer) {
            if !example.is_null() {
                debug!("Substituting inside OpenAPI example payload");
                substitute_json(example, rules, variables);
                return;
            }
        }
    }

    substitute_json(body, rules, variables);
}

fn substitute_json(target: &mut JsonValue, rules: &[Substitution], variables: &VariableStore) {
    for rule in rules {
        let Some(replacement) = resolve_replacement(rule, variables) else {
            continue;
        };

        if target.is_object() || target.is_array() {
            if patcher::patch(target, &rule.regex, &replacement) {
                continue;
            }
        }

        let Some(regex) = compile_rule(rule) else {
            continue;
        };

        let serialized = serialize_body(target);
        let replaced = regex.replace_all(&serialized, NoExpand(&replacement));
        if replaced == serialized.as_str() {
            debug!("No matches found for pattern: {}", rule.regex);
            continue;
        }

        reparse_into(target, &replaced, &rule.regex);
    }

    fill_placeholders(target, variables);
}

/// Fills `${name}` placeholders in every string of a JSON tree, keys
/// included. Values are inserted as string content, never as JSON text.
fn fill_placeholders(node: &mut JsonValue, variables: &VariableStore) {
    match node {
        JsonValue::String(text) => {
            if text.contains("${") {
                *text = replace_placeholders(text, variables);
            }
        }
        JsonValue::Array(items) => {
            for item in items.iter_mut() {
                fill_placeholders(item, variables);
            }
        }
        JsonValue::Object(map) => {
            if map.keys().any(|key| key.contains("${")) {
                let entries = std::mem::take(map);
                *map = entries
                    .into_iter()
                    .map(|(key, value)| (replace_placeholders(&key, variables), value))
                    .collect();
            }
            for value in map.values_mut() {
                fill_placeholders(value, variables);
            }
        }
        _ => {}
    }
}

fn serialize_body(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Replaces `target` with `text` parsed as JSON; leaves it unchanged if the
/// text no longer parses.
fn reparse_into(target: &mut JsonValue, text: &str, pattern: &str) {
    if let JsonValue::String(current) = target {
        *current = text.to_string();
        return;
    }

    match serde_json::from_str::<JsonValue>(text) {
        Ok(parsed) => {
            debug!("Applied substitution to serialized body: {}", pattern);
            *target = parsed;
        }
        Err(e) => {
            warn!(
                "Body is no longer valid JSON after applying '{}' ({}), keeping previous body",
                pattern, e
            );
        }
    }
}
