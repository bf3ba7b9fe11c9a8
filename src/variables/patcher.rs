//! Structure-aware replacement of JSON field values.
//!
//! Substitution rules are authored as regexes against the serialized body,
//! e.g. `"method":"call"`. Replacing such a pattern in the serialized text is
//! fragile (key order, escaping, duplicate field names at different depths),
//! so for structured bodies the rule is first read as a *hint*: a field name,
//! optionally an expected current value, and whether that value is numeric.
//! The hint then drives an in-place walk of the JSON tree.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value as JsonValue};

/// `"field":"value"`
static STRING_FIELD_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"]+)"\s*:\s*"([^"]*)""#).expect("Failed to compile string field hint regex")
});

/// `"field":123`
static NUMERIC_FIELD_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([^"]+)"\s*:\s*(\d+)"#).expect("Failed to compile numeric field hint regex")
});

/// `"field"`
static BARE_FIELD_HINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)""#).expect("Failed to compile bare field hint regex"));

/// Field reference recovered from a substitution regex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHint {
    /// Name of the JSON field to patch.
    pub field: String,

    /// Value the field must currently hold (or contain) to be patched.
    pub expected: Option<String>,

    /// Whether the hint referenced a numeric value.
    pub numeric: bool,
}

impl FieldHint {
    /// Recovers a field hint from a regex, trying the string, numeric and
    /// bare-field shapes in that order.
    ///
    /// # Examples
    ///
    /// ```
    /// use request_replay::variables::patcher::FieldHint;
    ///
    /// let hint = FieldHint::parse(r#""method":"call""#).unwrap();
    /// assert_eq!(hint.field, "method");
    /// assert_eq!(hint.expected.as_deref(), Some("call"));
    ///
    /// assert!(FieldHint::parse("no quotes here").is_none());
    /// ```
    pub fn parse(regex_hint: &str) -> Option<Self> {
        if let Some(caps) = STRING_FIELD_HINT.captures(regex_hint) {
            return Some(Self {
                field: caps[1].to_string(),
                expected: Some(caps[2].to_string()),
                numeric: false,
            });
        }

        if let Some(caps) = NUMERIC_FIELD_HINT.captures(regex_hint) {
            return Some(Self {
                field: caps[1].to_string(),
                expected: Some(caps[2].to_string()),
                numeric: true,
            });
        }

        BARE_FIELD_HINT.captures(regex_hint).map(|caps| Self {
            field: caps[1].to_string(),
            expected: None,
            numeric: false,
        })
    }

    /// Returns true if a field currently holding `current` should be replaced.
    fn accepts(&self, current: &JsonValue) -> bool {
        let Some(expected) = &self.expected else {
            return true;
        };

        match current {
            JsonValue::String(s) if !self.numeric => s.contains(expected.as_str()),
            JsonValue::Number(n) if self.numeric => n.to_string() == *expected,
            _ => false,
        }
    }

    /// Builds the replacement value, coercing to a number for numeric hints.
    fn replacement(&self, new_value: &str) -> JsonValue {
        if self.numeric {
            if let Some(number) = parse_number(new_value) {
                return JsonValue::Number(number);
            }
        }
        JsonValue::String(new_value.to_string())
    }
}

fn parse_number(text: &str) -> Option<Number> {
    let trimmed = text.trim();
    if let Ok(int) = trimmed.parse::<i64>() {
        return Some(int.into());
    }
    trimmed.parse::<f64>().ok().and_then(Number::from_f64)
}

/// Patches every field matching `regex_hint` in `target`, in place.
///
/// Returns whether at least one field was replaced. Targets that are not
/// objects or arrays, and hints with no recoverable field name, report no
/// modification.
///
/// # Examples
///
/// ```
/// use request_replay::variables::patcher::patch;
/// use serde_json::json;
///
/// let mut body = json!({"method": "call", "params": {}});
/// assert!(patch(&mut body, r#""method":"call""#, "onchange"));
/// assert_eq!(body, json!({"method": "onchange", "params": {}}));
/// ```
pub fn patch(target: &mut JsonValue, regex_hint: &str, new_value: &str) -> bool {
    if !target.is_object() && !target.is_array() {
        return false;
    }

    let Some(hint) = FieldHint::parse(regex_hint) else {
        debug!("No field name recoverable from pattern {}", regex_hint);
        return false;
    };

    let replacement = hint.replacement(new_value);
    let modified = patch_node(target, &hint, &replacement, "");
    if modified {
        debug!(
            "Patched field '{}' (expected {:?}) -> {}",
            hint.field, hint.expected, replacement
        );
    }
    modified
}

fn patch_node(node: &mut JsonValue, hint: &FieldHint, replacement: &JsonValue, path: &str) -> bool {
    let mut modified = false;

    match node {
        JsonValue::Array(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                if item.is_object() || item.is_array() {
                    let child_path = format!("{}[{}]", path, index);
                    modified |= patch_node(item, hint, replacement, &child_path);
                }
            }
        }
        JsonValue::Object(map) => {
            for (key, value) in map.iter_mut() {
                if *key == hint.field {
                    if hint.accepts(value) {
                        debug!("Patching {}.{}: {} -> {}", path, key, value, replacement);
                        *value = replacement.clone();
                        modified = true;
                    }
                } else if value.is_object() || value.is_array() {
                    let child_path = if path.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", path, key)
                    };
                    modified |= patch_node(value, hint, replacement, &child_path);
                }
            }
        }
        _ => {}
    }

    modified
}
