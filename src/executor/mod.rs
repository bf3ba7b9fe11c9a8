//! HTTP request executor.
//!
//! The replay engine hands a processed [`Step`] to a [`RequestExecutor`],
//! which turns it into a [`PreparedRequest`], sends it through a pluggable
//! [`Transport`] and normalizes whatever comes back into a
//! [`NormalizedResponse`].
//!
//! Preparation:
//! - structured bodies are serialized as JSON, with `Content-Type:
//!   application/json` added when the step does not set one
//! - string bodies are sent unchanged
//! - stripped headers (`origin`, `referer`, `host`, `connection`, ...) are
//!   removed and the request source marker is added
//!
//! When the transport fails, imported steps get a synthetic 202 response
//! describing why they could not run, GET/HEAD requests are retried in
//! reduced-fidelity mode, and everything else surfaces as an error.

pub mod config;
pub mod error;
pub mod native;

pub use config::{ExecutionConfig, RetryPolicy};
pub use error::RequestError;
pub use native::ReqwestTransport;

use crate::models::{body_payload, ContentType, NormalizedResponse, Step};
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;

/// Status text of the synthetic response returned for imported steps.
pub const IMPORTED_STATUS_TEXT: &str = "Imported Request - Limited Replay";

/// Status text of the synthetic response returned by a reduced-fidelity retry.
pub const REDUCED_FIDELITY_STATUS_TEXT: &str = "OK (Reduced-Fidelity Mode - Limited Response)";

/// Body of the synthetic response returned by a reduced-fidelity retry.
pub const REDUCED_FIDELITY_BODY: &str = "[Response body unavailable in reduced-fidelity mode]";

/// How the transport should send a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Send everything and read the full response.
    Full,
    /// Only establish that the request goes through. The response content
    /// is not read and is discarded.
    Opaque,
}

/// A request ready to be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    /// Uppercased HTTP method.
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl PreparedRequest {
    /// Gets a header value, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response as read off the wire, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    /// Final URL after redirects.
    pub url: Option<String>,
}

/// Sends prepared requests.
///
/// Timeouts are the transport's responsibility; the executor awaits
/// whatever the transport returns.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &PreparedRequest,
        mode: FetchMode,
    ) -> Result<RawResponse, RequestError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn send(
        &self,
        request: &PreparedRequest,
        mode: FetchMode,
    ) -> Result<RawResponse, RequestError> {
        (**self).send(request, mode).await
    }
}

/// Executes processed steps through a [`Transport`].
#[derive(Debug)]
pub struct RequestExecutor<T> {
    transport: T,
    config: ExecutionConfig,
}

impl RequestExecutor<ReqwestTransport> {
    /// Creates an executor over a reqwest transport built from the global
    /// configuration.
    pub fn from_global_config() -> Result<Self, RequestError> {
        let config = ExecutionConfig::from_global_config();
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> RequestExecutor<T> {
    pub fn new(transport: T, config: ExecutionConfig) -> Self {
        Self { transport, config }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Executes a processed step and returns its normalized response.
    ///
    /// Transport failures go through the fallback paths described in the
    /// module docs before being returned as errors.
    pub async fn execute(&self, step: &Step) -> Result<NormalizedResponse, RequestError> {
        let request = match self.prepare(step) {
            Ok(request) => request,
            Err(e) if step.is_imported() => {
                debug!("Imported step '{}' cannot be prepared: {}", step.name, e);
                return Ok(imported_response(step));
            }
            Err(e) => return Err(e),
        };

        debug!("Sending {} {}", request.method, request.url);

        match self.transport.send(&request, FetchMode::Full).await {
            Ok(raw) => Ok(self.normalize(raw)),
            Err(e) => self.fallback(step, &request, e).await,
        }
    }

    /// Builds the wire request for a processed step.
    pub fn prepare(&self, step: &Step) -> Result<PreparedRequest, RequestError> {
        validate_url(&step.url)?;

        let method = step.method.trim().to_uppercase();
        let mut headers: Vec<(String, String)> = step
            .request_headers
            .iter()
            .filter(|(name, _)| {
                let stripped = self.config.is_stripped(name);
                if stripped {
                    debug!("Stripping header {}", name);
                }
                !stripped
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let (body, is_json) = match &step.request_body {
            Some(_) if method == "GET" || method == "HEAD" => {
                debug!("Dropping body of {} request", method);
                (None, false)
            }
            Some(body) => prepare_body(body),
            None => (None, false),
        };

        if body.is_some() && is_json && !has_header(&headers, "content-type") {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        if let Some((name, value)) = &self.config.source_header {
            if !has_header(&headers, name) {
                headers.push((name.clone(), value.clone()));
            }
        }

        Ok(PreparedRequest {
            method,
            url: step.url.clone(),
            headers,
            body,
        })
    }

    /// Converts a raw response into the shape the engine consumes.
    pub fn normalize(&self, raw: RawResponse) -> NormalizedResponse {
        normalize_response(raw, self.config.binary_inline_limit)
    }

    async fn fallback(
        &self,
        step: &Step,
        request: &PreparedRequest,
        error: RequestError,
    ) -> Result<NormalizedResponse, RequestError> {
        warn!(
            "{} {} failed, trying fallback: {}",
            request.method, request.url, error
        );

        if step.is_imported() {
            debug!(
                "Returning limited replay response for imported step '{}'",
                step.name
            );
            return Ok(imported_response(step));
        }

        if request.method != "GET" && request.method != "HEAD" {
            return Err(RequestError::Unrecoverable {
                method: request.method.clone(),
                url: request.url.clone(),
                message: error.to_string(),
            });
        }

        let policy = &self.config.fallback_retry;
        let mut last_error = None;

        for attempt in 0..policy.max_attempts.max(1) {
            let delay = policy.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            debug!(
                "Reduced-fidelity attempt {} for {}",
                attempt + 1,
                request.url
            );

            match self.transport.send(request, FetchMode::Opaque).await {
                Ok(_) => return Ok(reduced_fidelity_response(request)),
                Err(e) => last_error = Some(e),
            }
        }

        Err(RequestError::FallbackFailed {
            original: error.to_string(),
            fallback: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

/// Serializes a step body for the wire. Returns the text and whether it is
/// JSON.
fn prepare_body(body: &JsonValue) -> (Option<String>, bool) {
    match body_payload(body) {
        JsonValue::Null => (None, false),
        JsonValue::String(text) if text.is_empty() => (None, false),
        JsonValue::String(text) => (Some(text.clone()), false),
        JsonValue::Object(map) if map.is_empty() => (None, false),
        other => (Some(other.to_string()), true),
    }
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
}

/// Validates that the URL is well-formed and uses a supported protocol.
fn validate_url(url: &str) -> Result<(), RequestError> {
    let parsed = url::Url::parse(url)?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(RequestError::UnsupportedProtocol(format!(
            "Only HTTP and HTTPS are supported, got: {}",
            scheme
        )));
    }

    Ok(())
}

fn imported_response(step: &Step) -> NormalizedResponse {
    let body = json!({
        "note": concat!(
            "This request was imported from an OpenAPI specification and cannot be fully ",
            "executed outside the context it was recorded in."
        ),
        "request_url": step.url,
        "request_method": step.method,
        "original_path": step.original_path.as_deref().unwrap_or("(unknown)"),
    });

    let mut response = NormalizedResponse::new(202, IMPORTED_STATUS_TEXT, body);
    response.url = Some(step.url.clone());
    response.note = Some("imported".to_string());
    response
}

fn reduced_fidelity_response(request: &PreparedRequest) -> NormalizedResponse {
    let mut response = NormalizedResponse::new(
        200,
        REDUCED_FIDELITY_STATUS_TEXT,
        JsonValue::String(REDUCED_FIDELITY_BODY.to_string()),
    );
    response.url = Some(request.url.clone());
    response.note = Some("reduced-fidelity".to_string());
    response
}

/// Normalizes a raw response body according to its content type.
///
/// JSON bodies are parsed (falling back to text if they do not parse), text
/// bodies pass through, and anything else becomes a placeholder unless it is
/// valid UTF-8 shorter than `inline_limit` bytes.
pub fn normalize_response(raw: RawResponse, inline_limit: usize) -> NormalizedResponse {
    let headers: BTreeMap<String, String> = raw
        .headers
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect();

    let content_type = headers.get("content-type").cloned();
    let kind = content_type
        .as_deref()
        .map(ContentType::from_header)
        .unwrap_or(ContentType::Binary);

    let body = match kind {
        ContentType::Json => match serde_json::from_slice::<JsonValue>(&raw.body) {
            Ok(value) => value,
            Err(e) => {
                debug!("Response declared JSON but did not parse: {}", e);
                JsonValue::String(String::from_utf8_lossy(&raw.body).into_owned())
            }
        },
        ContentType::Text => JsonValue::String(String::from_utf8_lossy(&raw.body).into_owned()),
        ContentType::Binary => {
            let inline = (!raw.body.is_empty() && raw.body.len() < inline_limit)
                .then(|| std::str::from_utf8(&raw.body).ok())
                .flatten();

            match inline {
                Some(text) => JsonValue::String(text.to_string()),
                None => JsonValue::String(format!(
                    "[Binary data or unsupported content type: {}]",
                    content_type.as_deref().unwrap_or("unknown")
                )),
            }
        }
    };

    NormalizedResponse {
        status: raw.status,
        status_text: raw.status_text,
        headers,
        body,
        url: raw.url,
        note: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Step;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Transport that replays a queue of canned outcomes and records calls.
    #[derive(Default)]
    struct ScriptedTransport {
        outcomes: Mutex<VecDeque<Result<RawResponse, RequestError>>>,
        calls: Mutex<Vec<(PreparedRequest, FetchMode)>>,
    }

    impl ScriptedTransport {
        fn with(outcomes: Vec<Result<RawResponse, RequestError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(PreparedRequest, FetchMode)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            request: &PreparedRequest,
            mode: FetchMode,
        ) -> Result<RawResponse, RequestError> {
            self.calls.lock().unwrap().push((request.clone(), mode));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RequestError::NetworkError("script exhausted".to_string())))
        }
    }

    fn test_config() -> ExecutionConfig {
        ExecutionConfig {
            timeout: Duration::from_secs(5),
            follow_redirects: true,
            max_redirects: 10,
            validate_ssl: true,
            stripped_headers: vec![
                "origin".to_string(),
                "referer".to_string(),
                "host".to_string(),
                "connection".to_string(),
            ],
            source_header: Some(("X-Request-Source".to_string(), "request-replay".to_string())),
            binary_inline_limit: 16,
            fallback_retry: RetryPolicy::once(),
        }
    }

    fn json_raw(status: u16, body: &str) -> RawResponse {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        RawResponse {
            status,
            status_text: "OK".to_string(),
            headers,
            body: body.as_bytes().to_vec(),
            url: None,
        }
    }

    fn executor(
        outcomes: Vec<Result<RawResponse, RequestError>>,
    ) -> RequestExecutor<ScriptedTransport> {
        RequestExecutor::new(ScriptedTransport::with(outcomes), test_config())
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("http://example.com").is_ok());
        assert!(validate_url("https://api.example.com/v1/users").is_ok());
        assert!(validate_url("not a url").is_err());
        assert!(matches!(
            validate_url("ftp://example.com"),
            Err(RequestError::UnsupportedProtocol(_))
        ));
    }

    #[test]
    fn test_prepare_serializes_structured_body() {
        let step = Step::new("s", "post", "https://api.example.com/items")
            .with_body(json!({"name": "widget"}));

        let request = executor(vec![]).prepare(&step).unwrap();

        assert_eq!(request.method, "POST");
        assert_eq!(request.body.as_deref(), Some(r#"{"name":"widget"}"#));
        assert_eq!(request.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_prepare_keeps_existing_content_type_and_text_body() {
        let step = Step::new("s", "POST", "https://api.example.com/form")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body(json!("a=1&b=2"));

        let request = executor(vec![]).prepare(&step).unwrap();

        assert_eq!(request.body.as_deref(), Some("a=1&b=2"));
        assert_eq!(
            request.header("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn test_prepare_strips_forbidden_headers() {
        let step = Step::new("s", "GET", "https://api.example.com/")
            .with_header("Origin", "https://app.example.com")
            .with_header("Referer", "https://app.example.com/page")
            .with_header("Host", "api.example.com")
            .with_header("Connection", "keep-alive")
            .with_header("Authorization", "Bearer t");

        let request = executor(vec![]).prepare(&step).unwrap();
        let names: Vec<&str> = request.headers.iter().map(|(k, _)| k.as_str()).collect();

        assert_eq!(names, vec!["Authorization", "X-Request-Source"]);
    }

    #[test]
    fn test_prepare_skips_empty_bodies() {
        let exec = executor(vec![]);
        for body in [json!({}), json!(""), json!(null)] {
            let step = Step::new("s", "POST", "https://api.example.com/").with_body(body);
            let request = exec.prepare(&step).unwrap();
            assert!(request.body.is_none());
            assert!(request.header("content-type").is_none());
        }
    }

    #[test]
    fn test_prepare_unwraps_openapi_envelope() {
        let step = Step::new("s", "POST", "https://api.example.com/")
            .with_body(json!({"content": {"application/json": {"example": {"id": 1}}}}));

        let request = executor(vec![]).prepare(&step).unwrap();
        assert_eq!(request.body.as_deref(), Some(r#"{"id":1}"#));
    }

    #[test]
    fn test_normalize_json_text_and_binary() {
        let response = normalize_response(json_raw(200, r#"{"ok":true}"#), 16);
        assert_eq!(response.body, json!({"ok": true}));
        assert_eq!(response.header("content-type"), Some("application/json"));

        let broken = normalize_response(json_raw(200, "{oops"), 16);
        assert_eq!(broken.body, json!("{oops"));

        let mut text = json_raw(200, "hello");
        text.headers
            .insert("Content-Type".to_string(), "text/plain".to_string());
        assert_eq!(normalize_response(text, 16).body, json!("hello"));

        let mut small = json_raw(200, "tiny");
        small.headers.clear();
        assert_eq!(normalize_response(small, 16).body, json!("tiny"));

        let mut large = json_raw(200, "this body is longer than the limit");
        large
            .headers
            .insert("Content-Type".to_string(), "image/png".to_string());
        assert_eq!(
            normalize_response(large, 16).body,
            json!("[Binary data or unsupported content type: image/png]")
        );
    }

    #[tokio::test]
    async fn test_execute_success() {
        let exec = executor(vec![Ok(json_raw(201, r#"{"id":9}"#))]);
        let step = Step::new("s", "POST", "https://api.example.com/items")
            .with_body(json!({"name": "x"}));

        let response = exec.execute(&step).await.unwrap();

        assert_eq!(response.status, 201);
        assert_eq!(response.body, json!({"id": 9}));
        assert_eq!(exec.transport().calls()[0].1, FetchMode::Full);
    }

    #[tokio::test]
    async fn test_imported_step_gets_limited_replay_response() {
        let exec = executor(vec![Err(RequestError::NetworkError("blocked".to_string()))]);
        let mut step = Step::new("s", "POST", "https://api.example.com/users/1");
        step.original_path = Some("/users/{id}".to_string());

        let response = exec.execute(&step).await.unwrap();

        assert_eq!(response.status, 202);
        assert_eq!(response.status_text, IMPORTED_STATUS_TEXT);
        assert_eq!(response.body["original_path"], "/users/{id}");
        assert_eq!(response.body["request_method"], "POST");
    }

    #[tokio::test]
    async fn test_imported_step_with_relative_url() {
        let exec = executor(vec![]);
        let mut step = Step::new("s", "GET", "/users/{id}");
        step.imported_from_openapi = true;

        let response = exec.execute(&step).await.unwrap();
        assert_eq!(response.status, 202);
        assert!(exec.transport().calls().is_empty());
    }

    #[tokio::test]
    async fn test_get_falls_back_to_reduced_fidelity() {
        let exec = executor(vec![
            Err(RequestError::NetworkError("blocked".to_string())),
            Ok(RawResponse::default()),
        ]);
        let step = Step::new("s", "GET", "https://api.example.com/items");

        let response = exec.execute(&step).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.status_text, REDUCED_FIDELITY_STATUS_TEXT);
        assert_eq!(response.body, json!(REDUCED_FIDELITY_BODY));

        let modes: Vec<FetchMode> = exec.transport().calls().into_iter().map(|c| c.1).collect();
        assert_eq!(modes, vec![FetchMode::Full, FetchMode::Opaque]);
    }

    #[tokio::test]
    async fn test_get_fallback_respects_retry_policy() {
        let mut config = test_config();
        config.fallback_retry = RetryPolicy::new(3, 1, 2.0);
        let transport = ScriptedTransport::with(vec![
            Err(RequestError::NetworkError("blocked".to_string())),
            Err(RequestError::NetworkError("still down".to_string())),
            Err(RequestError::NetworkError("still down".to_string())),
            Err(RequestError::NetworkError("gone".to_string())),
        ]);
        let exec = RequestExecutor::new(transport, config);

        let err = exec
            .execute(&Step::new("s", "HEAD", "https://api.example.com/"))
            .await
            .unwrap_err();

        assert_eq!(exec.transport().calls().len(), 4);
        match err {
            RequestError::FallbackFailed { original, fallback } => {
                assert!(original.contains("blocked"));
                assert!(fallback.contains("gone"));
            }
            other => panic!("Expected FallbackFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_post_failure_is_unrecoverable() {
        let exec = executor(vec![Err(RequestError::NetworkError("refused".to_string()))]);
        let step = Step::new("s", "POST", "https://api.example.com/orders");

        let err = exec.execute(&step).await.unwrap_err();

        assert!(matches!(err, RequestError::Unrecoverable { .. }));
        assert!(err.to_string().contains("POST"));
        assert_eq!(exec.transport().calls().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_retried() {
        let exec = executor(vec![]);
        let err = exec
            .execute(&Step::new("s", "GET", "not a url"))
            .await
            .unwrap_err();

        assert!(matches!(err, RequestError::InvalidUrl(_)));
        assert!(exec.transport().calls().is_empty());
    }
}
