//! Step import from OpenAPI documents and raw recordings.
//!
//! Exported recordings are OpenAPI 3 documents with a few vendor
//! extensions that carry what plain OpenAPI cannot express:
//!
//! - `x-original-url`: the exact URL that was recorded
//! - `x-raw-body`: the request body as it was sent
//! - `x-variable-substitution` / `x-variable-capture`: replay rules
//! - `x-recorded-index`: position of the operation in the recording, used to
//!   restore order for documents tagged with `x-ark-replayr`
//!
//! Documents may also carry a `rawRequests` array, in which case the raw
//! recording is used instead of the paths.
//!
//! Only what replay needs is read; this is not an OpenAPI validator.

use crate::models::{body_payload, Capture, Step, Substitution};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

/// Methods kept when converting a raw recording.
pub const RECORDED_METHODS: [&str; 5] = ["GET", "POST", "PUT", "DELETE", "PATCH"];

/// Index given to operations without `x-recorded-index`.
const UNRECORDED_INDEX: i64 = 9999;

/// Path item keys that are not operations.
const NON_OPERATION_KEYS: [&str; 4] = ["parameters", "summary", "description", "servers"];

/// Errors that can occur while importing steps.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not an OpenAPI document: missing '{0}'")]
    NotOpenApi(&'static str),
}

/// Returns true if `doc` should be read with [`extract_steps`].
pub fn is_openapi_document(doc: &JsonValue) -> bool {
    doc.get("openapi").is_some() || doc.get("rawRequests").map_or(false, JsonValue::is_array)
}

/// Parses a JSON document and extracts its steps.
pub fn parse_document(text: &str) -> Result<Vec<Step>, ImportError> {
    let doc: JsonValue = serde_json::from_str(text)?;
    extract_steps(&doc)
}

/// Extracts replay steps from an OpenAPI document.
///
/// Every operation becomes one step flagged as imported, with its path
/// template kept as `original_path`. The step URL is, in order of
/// preference, the operation's `x-original-url`, the document's
/// `x-original-urls["<method>-<path>"]`, or the first server URL joined with
/// the path and the query parameter examples.
///
/// # Examples
///
/// ```
/// use request_replay::openapi::extract_steps;
/// use serde_json::json;
///
/// let doc = json!({
///     "openapi": "3.0.0",
///     "servers": [{"url": "https://api.example.com"}],
///     "paths": {"/users": {"get": {"summary": "List users"}}}
/// });
///
/// let steps = extract_steps(&doc).unwrap();
/// assert_eq!(steps[0].name, "List users");
/// assert_eq!(steps[0].url, "https://api.example.com/users");
/// ```
pub fn extract_steps(doc: &JsonValue) -> Result<Vec<Step>, ImportError> {
    if let Some(raw) = doc.get("rawRequests").and_then(JsonValue::as_array) {
        info!("Using {} raw recorded request(s) from document", raw.len());
        return Ok(steps_from_recorded(raw));
    }

    if doc.get("openapi").is_none() {
        return Err(ImportError::NotOpenApi("openapi"));
    }
    let paths = doc
        .get("paths")
        .and_then(JsonValue::as_object)
        .ok_or(ImportError::NotOpenApi("paths"))?;

    let is_recording = matches!(
        doc.pointer("/x-ark-replayr/type").and_then(JsonValue::as_str),
        Some("recording") | Some("raw-recording")
    );

    let server = doc
        .pointer("/servers/0/url")
        .and_then(JsonValue::as_str)
        .unwrap_or("");

    let mut operations: Vec<(i64, &str, &str, &Map<String, JsonValue>)> = Vec::new();
    for (path, item) in paths {
        let Some(item) = item.as_object() else {
            continue;
        };

        for (method, operation) in item {
            if NON_OPERATION_KEYS.contains(&method.as_str()) {
                continue;
            }
            let Some(operation) = operation.as_object() else {
                continue;
            };

            let index = operation
                .get("x-recorded-index")
                .and_then(JsonValue::as_i64)
                .unwrap_or(UNRECORDED_INDEX);
            operations.push((index, path.as_str(), method.as_str(), operation));
        }
    }

    if is_recording {
        operations.sort_by_key(|(index, ..)| *index);
    }

    let steps: Vec<Step> = operations
        .into_iter()
        .map(|(_, path, method, operation)| {
            let url = original_url(doc, path, method, operation)
                .unwrap_or_else(|| reconstruct_url(server, path, operation));
            step_from_operation(path, method, operation, url)
        })
        .collect();

    info!("Extracted {} step(s) from OpenAPI document", steps.len());
    Ok(steps)
}

fn original_url(
    doc: &JsonValue,
    path: &str,
    method: &str,
    operation: &Map<String, JsonValue>,
) -> Option<String> {
    operation
        .get("x-original-url")
        .and_then(JsonValue::as_str)
        .or_else(|| {
            doc.get("x-original-urls")
                .and_then(|urls| urls.get(format!("{}-{}", method.to_lowercase(), path)))
                .and_then(JsonValue::as_str)
        })
        .filter(|url| !url.is_empty())
        .map(str::to_string)
}

fn reconstruct_url(server: &str, path: &str, operation: &Map<String, JsonValue>) -> String {
    let query: Vec<String> = parameters(operation, "query")
        .map(|(name, example)| format!("{}={}", name, encode_component(&example)))
        .collect();

    let mut url = format!("{}{}", server, path);
    if !query.is_empty() {
        url.push('?');
        url.push_str(&query.join("&"));
    }

    debug!("Reconstructed URL for {}: {}", path, url);
    url
}

/// Percent-encodes a query value the way `encodeURIComponent` does: spaces
/// become `%20` and `!'()*-._~` stay literal.
fn encode_component(value: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
    encoded
        .replace('+', "%20")
        .replace("%21", "!")
        .replace("%27", "'")
        .replace("%28", "(")
        .replace("%29", ")")
        .replace("%7E", "~")
}

/// Parameters of the given location as `(name, example)` pairs.
fn parameters<'a>(
    operation: &'a Map<String, JsonValue>,
    location: &'a str,
) -> impl Iterator<Item = (&'a str, String)> + 'a {
    operation
        .get("parameters")
        .and_then(JsonValue::as_array)
        .into_iter()
        .flatten()
        .filter(move |param| param.get("in").and_then(JsonValue::as_str) == Some(location))
        .filter_map(|param| {
            let name = param.get("name")?.as_str()?;
            Some((name, scalar_text(param.get("example"))))
        })
}

fn scalar_text(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

fn step_from_operation(
    path: &str,
    method: &str,
    operation: &Map<String, JsonValue>,
    url: String,
) -> Step {
    let method = method.to_uppercase();

    let name = ["summary", "operationId"]
        .iter()
        .filter_map(|key| operation.get(*key).and_then(JsonValue::as_str))
        .find(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} {}", method, path));

    let mut step = Step::new(name, method, url);

    for (header, example) in parameters(operation, "header") {
        step.request_headers.insert(header.to_string(), example);
    }

    // x-raw-body wins even when null
    let body = match operation.get("x-raw-body") {
        Some(raw) => Some(raw.clone()),
        None => operation
            .get("requestBody")
            .map(|body| body_payload(body).clone())
            .or_else(|| operation.get("body").cloned()),
    };
    step.request_body = body.filter(|body| !body.is_null());

    step.variable_substitutions =
        rules::<Substitution>(operation, "x-variable-substitution", &step.name);
    step.variable_captures = rules::<Capture>(operation, "x-variable-capture", &step.name);
    step.imported_from_openapi = true;
    step.original_path = Some(path.to_string());

    step
}

/// Decodes a rule list extension. Undecodable lists are dropped with a
/// warning rather than failing the whole import.
fn rules<T: DeserializeOwned>(operation: &Map<String, JsonValue>, key: &str, step: &str) -> Vec<T> {
    let Some(value) = operation.get(key) else {
        return Vec::new();
    };

    match serde_json::from_value(value.clone()) {
        Ok(rules) => rules,
        Err(e) => {
            warn!("Ignoring invalid {} on step '{}': {}", key, step, e);
            Vec::new()
        }
    }
}

/// Converts raw recorded requests into steps.
///
/// Entries that are not objects, have no URL, or use a method outside
/// [`RECORDED_METHODS`] are dropped. Steps are named
/// `Step <n>: <METHOD> <path>`, numbered over the kept entries.
pub fn steps_from_recorded(records: &[JsonValue]) -> Vec<Step> {
    let steps: Vec<Step> = records
        .iter()
        .filter_map(|record| {
            let method = record.get("method")?.as_str()?;
            if !RECORDED_METHODS.contains(&method) {
                return None;
            }
            let url = record.get("url")?.as_str()?;
            Some((record, method, url))
        })
        .enumerate()
        .map(|(index, (record, method, url))| {
            let path = url::Url::parse(url)
                .map(|parsed| parsed.path().to_string())
                .unwrap_or_else(|_| url.to_string());

            let mut step = Step::new(
                format!("Step {}: {} {}", index + 1, method, path),
                method,
                url,
            );

            if let Some(headers) = record.get("headers").or_else(|| record.get("requestHeaders")) {
                step.request_headers = recorded_headers(headers);
            }

            step.request_body = record
                .get("body")
                .or_else(|| record.get("requestBody"))
                .and_then(recorded_body);

            step
        })
        .collect();

    debug!(
        "Converted {} of {} recorded request(s)",
        steps.len(),
        records.len()
    );
    steps
}

/// Accepts both a header object and a `[{name, value}]` list.
fn recorded_headers(headers: &JsonValue) -> std::collections::BTreeMap<String, String> {
    match headers {
        JsonValue::Object(map) => map
            .iter()
            .map(|(name, value)| (name.clone(), scalar_text(Some(value))))
            .collect(),
        JsonValue::Array(list) => list
            .iter()
            .filter_map(|entry| {
                let name = entry.get("name")?.as_str()?;
                Some((name.to_string(), scalar_text(entry.get("value"))))
            })
            .collect(),
        _ => Default::default(),
    }
}

/// Unwraps an envelope example, or a bare `content` wrapper.
fn recorded_body(body: &JsonValue) -> Option<JsonValue> {
    if body.is_null() {
        return None;
    }

    let payload = body_payload(body);
    if !std::ptr::eq(payload, body) {
        return Some(payload.clone());
    }

    match body.get("content") {
        Some(content) if !content.is_null() => Some(content.clone()),
        _ => Some(body.clone()),
    }
}
