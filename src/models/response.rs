//! Normalized HTTP response model.
//!
//! Whatever the transport hands back, the replay engine only ever sees a
//! [`NormalizedResponse`]: status, headers and a body that is either parsed
//! JSON or text.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Content type of a response body, as far as normalization cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// JSON content (application/json, application/*+json)
    Json,

    /// Textual content (text/*, XML)
    Text,

    /// Binary or unknown content
    Binary,
}

impl ContentType {
    /// Determines the content type from a Content-Type header value.
    ///
    /// # Examples
    ///
    /// ```
    /// use request_replay::models::ContentType;
    ///
    /// assert_eq!(ContentType::from_header("application/json"), ContentType::Json);
    /// assert_eq!(ContentType::from_header("text/html; charset=utf-8"), ContentType::Text);
    /// assert_eq!(ContentType::from_header("image/png"), ContentType::Binary);
    /// ```
    pub fn from_header(content_type_header: &str) -> Self {
        let lower = content_type_header.to_lowercase();

        // Remove charset and other parameters
        let media_type = lower.split(';').next().unwrap_or("").trim();

        if media_type.contains("json") {
            ContentType::Json
        } else if media_type.starts_with("text/") || media_type.contains("xml") {
            ContentType::Text
        } else {
            ContentType::Binary
        }
    }
}

/// An HTTP response in the shape the replay engine consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResponse {
    /// HTTP status code (e.g., 200, 404, 500).
    pub status: u16,

    /// Human-readable status description.
    pub status_text: String,

    /// Response headers, names lowercased by the transport.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Parsed JSON for JSON content types, otherwise a JSON string holding
    /// the text or a placeholder description.
    pub body: JsonValue,

    /// Final URL after redirects, when the transport knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Set on synthetic responses produced by the executor's fallback paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl NormalizedResponse {
    /// Creates a response with a text body and no headers.
    pub fn new(status: u16, status_text: impl Into<String>, body: JsonValue) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: BTreeMap::new(),
            body,
            url: None,
            note: None,
        }
    }

    /// Statuses of 300 and above count as replay errors.
    pub fn is_http_error(&self) -> bool {
        self.status >= 300
    }

    /// Gets a header value, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the body as text: strings verbatim, anything else serialized.
    pub fn body_text(&self) -> String {
        match &self.body {
            JsonValue::String(text) => text.clone(),
            JsonValue::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Returns the headers serialized as a JSON object.
    pub fn headers_text(&self) -> String {
        serde_json::to_string(&self.headers).unwrap_or_default()
    }
}
