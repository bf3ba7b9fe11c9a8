//! Replay step data models.
//!
//! A [`Step`] is one HTTP request template plus the rules that rewrite it
//! before sending ([`Substitution`]) and the rules that extract variables
//! from its response ([`Capture`]). Steps are produced by a recorder or an
//! OpenAPI import and are never mutated by a replay; the engine always works
//! on a clone.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// One HTTP request template in a replay scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Display name, reported back in every [`StepResult`](super::StepResult).
    #[serde(default)]
    pub name: String,

    /// Target URL. May contain `${variable}` placeholders.
    pub url: String,

    /// HTTP method as recorded (e.g. "GET", "POST").
    #[serde(default = "default_method")]
    pub method: String,

    /// Request headers as recorded.
    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,

    /// Request body.
    ///
    /// `None` means no body. A JSON string value is treated as a raw text
    /// body; objects and arrays are structured bodies sent as JSON.
    #[serde(default)]
    pub request_body: Option<JsonValue>,

    /// Rules applied to URL, headers and body before execution.
    #[serde(default)]
    pub variable_substitutions: Vec<Substitution>,

    /// Rules applied to the response after execution.
    #[serde(default)]
    pub variable_captures: Vec<Capture>,

    /// Skip this step entirely.
    #[serde(default)]
    pub skip: bool,

    /// Disabled steps are skipped.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Whether this step was imported from an OpenAPI document rather than
    /// recorded live.
    #[serde(default, rename = "importedFromOpenAPI", alias = "importedFromOpenApi")]
    pub imported_from_openapi: bool,

    /// Path template the step was imported from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_path: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_enabled() -> bool {
    true
}

impl Step {
    /// Creates an enabled step with no headers, body or rules.
    pub fn new(name: impl Into<String>, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            method: method.into(),
            request_headers: BTreeMap::new(),
            request_body: None,
            variable_substitutions: Vec::new(),
            variable_captures: Vec::new(),
            skip: false,
            enabled: true,
            imported_from_openapi: false,
            original_path: None,
        }
    }

    /// Adds a request header, builder style.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.insert(name.into(), value.into());
        self
    }

    /// Sets the request body, builder style.
    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.request_body = Some(body);
        self
    }

    /// Appends a substitution rule, builder style.
    pub fn with_substitution(mut self, substitution: Substitution) -> Self {
        self.variable_substitutions.push(substitution);
        self
    }

    /// Appends a capture rule, builder style.
    pub fn with_capture(mut self, capture: Capture) -> Self {
        self.variable_captures.push(capture);
        self
    }

    /// Case-insensitive method comparison.
    pub fn method_is(&self, method: &str) -> bool {
        self.method.eq_ignore_ascii_case(method)
    }

    /// Returns true when the step came from an import and may not be
    /// runnable outside the context it was captured in.
    pub fn is_imported(&self) -> bool {
        self.imported_from_openapi
            || self
                .original_path
                .as_deref()
                .map_or(false, |path| path != self.url)
    }

    /// Gets the Content-Type header value if present.
    pub fn content_type(&self) -> Option<&str> {
        self.request_headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .map(|(_, v)| v.as_str())
    }
}

/// JSON pointers to the example payload inside an OpenAPI request-body
/// envelope, in lookup order.
pub const OPENAPI_EXAMPLE_POINTERS: [&str; 2] = [
    "/content/application~1json/example",
    "/content/application~1json/schema/example",
];

/// Returns the payload of a body, looking through an OpenAPI
/// `content.application/json.example` envelope when present.
pub fn body_payload(body: &JsonValue) -> &JsonValue {
    for pointer in OPENAPI_EXAMPLE_POINTERS {
        if let Some(example) = body.pointer(pointer) {
            if !example.is_null() {
                return example;
            }
        }
    }
    body
}

/// How a substitution obtains its replacement value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubstitutionMode {
    /// Use the literal `value`.
    Fixed,
    /// Look up `targetVariable` in the variable store.
    #[default]
    Variable,
}

/// A rule rewriting matches of `regex` in a step before it is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Substitution {
    /// Pattern to replace. An empty pattern makes the rule a no-op.
    #[serde(default)]
    pub regex: String,

    #[serde(default)]
    pub mode: SubstitutionMode,

    /// Literal replacement, meaningful when `mode` is `fixed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Variable name, meaningful when `mode` is `variable`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_variable: Option<String>,
}

impl Substitution {
    /// Creates a rule replacing `regex` with a literal value.
    pub fn fixed(regex: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            mode: SubstitutionMode::Fixed,
            value: Some(value.into()),
            target_variable: None,
        }
    }

    /// Creates a rule replacing `regex` with the stored value of `variable`.
    pub fn variable(regex: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            regex: regex.into(),
            mode: SubstitutionMode::Variable,
            value: None,
            target_variable: Some(variable.into()),
        }
    }
}

/// Where a capture rule reads its text from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum CaptureSource {
    /// The response body, serialized if structured.
    #[default]
    Body,
    /// The response headers serialized as a JSON object.
    Headers,
    /// The final response URL.
    Url,
}

impl From<String> for CaptureSource {
    fn from(source: String) -> Self {
        match source.as_str() {
            "headers" | "responseHeaders" => CaptureSource::Headers,
            "url" => CaptureSource::Url,
            // Unknown sources read the body
            _ => CaptureSource::Body,
        }
    }
}

/// A rule extracting a named variable from a response.
///
/// The variable value is capture group 1 of the first match of `regex`
/// against the selected source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
    /// Variable name. Rules without a name are skipped.
    #[serde(default)]
    pub name: String,

    /// Extraction pattern. Rules without a pattern are skipped.
    #[serde(default)]
    pub regex: String,

    #[serde(default)]
    pub source: CaptureSource,

    /// A required rule that does not capture marks the step as failed.
    #[serde(default)]
    pub required: bool,

    /// Set on rules appended from the run's global variable list.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_global: bool,
}

impl Capture {
    /// Creates an optional body capture.
    pub fn new(name: impl Into<String>, regex: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regex: regex.into(),
            source: CaptureSource::Body,
            required: false,
            is_global: false,
        }
    }

    /// Sets the source, builder style.
    pub fn from_source(mut self, source: CaptureSource) -> Self {
        self.source = source;
        self
    }

    /// Marks the rule as required, builder style.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Returns true if the rule has both a name and a pattern.
    pub fn is_well_formed(&self) -> bool {
        !self.name.is_empty() && !self.regex.is_empty()
    }
}
