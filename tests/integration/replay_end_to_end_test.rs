//! End-to-end replay tests
//!
//! These tests run complete scenarios against a wiremock server: variable
//! capture and reuse across steps, error classification, stop-on-error,
//! tracked progress persisted to a file store, and resuming from saved
//! variables.

use super::live_session;
use request_replay::models::{
    Capture, CaptureSource, ProgressEvent, ProgressStatus, Step, StepStatus, Substitution,
};
use request_replay::replay::{ProgressSink, ReplayOptions, StoreProgressSink};
use request_replay::storage::{JsonFileStore, KeyValueStore, REPLAY_PROGRESS_KEY};
use request_replay::variables::VariableStore;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mounts a small API: login, profile lookup, order creation.
async fn start_api() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .and(body_json(json!({"user": "alice", "password": "secret"})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-session", "sess-77")
                .set_body_json(json!({"token": "tok-123", "userId": 42})),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/42"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "alice"})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(body_json(json!({"order": {"customer_id": 42, "qty": 2}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"orderId": "ord-9"})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not here"))
        .mount(&server)
        .await;

    server
}

fn scenario(base: &str) -> Vec<Step> {
    vec![
        Step::new("login", "POST", format!("{}/login", base))
            .with_header("Origin", "https://app.example.com")
            .with_body(json!({"user": "alice", "password": "secret"}))
            .with_capture(Capture::new("token", r#""token":"([^"]+)""#).required())
            .with_capture(Capture::new("userId", r#""userId":(\d+)"#))
            .with_capture(
                Capture::new("session", r#""x-session":"([^"]+)""#)
                    .from_source(CaptureSource::Headers),
            ),
        Step::new("profile", "GET", format!("{}/users/USER_ID", base))
            .with_header("Authorization", "Bearer TOKEN")
            .with_substitution(Substitution::variable("USER_ID", "userId"))
            .with_substitution(Substitution::variable("TOKEN", "token")),
        Step::new("order", "POST", format!("{}/orders", base))
            .with_body(json!({"order": {"customer_id": 7, "qty": 2}}))
            .with_substitution(Substitution::variable(r#""customer_id":7"#, "userId"))
            .with_capture(Capture::new("orderId", r#""orderId":"([^"]+)""#).required()),
    ]
}

#[tokio::test]
async fn test_login_profile_order_flow() {
    let server = start_api().await;
    let mut session = live_session();

    let results = session
        .replay(&scenario(&server.uri()), &ReplayOptions::default())
        .await;

    assert_eq!(results.len(), 3);
    for result in &results {
        assert_eq!(result.status, StepStatus::Success, "{:?}", result.error);
    }

    assert_eq!(results[0].captured_variables["token"].as_text(), "tok-123");
    assert_eq!(
        results[0].captured_variables["session"].as_text(),
        "sess-77"
    );
    assert_eq!(
        results[1].request.as_ref().unwrap().url,
        format!("{}/users/42", server.uri())
    );
    assert_eq!(
        results[1].response.as_ref().unwrap().body,
        json!({"name": "alice"})
    );
    assert_eq!(results[2].response.as_ref().unwrap().status, 201);
    assert_eq!(
        session.variables().get("orderId").unwrap().as_text(),
        "ord-9"
    );
}

#[tokio::test]
async fn test_replayed_requests_are_cleaned() {
    let server = start_api().await;
    let mut session = live_session();

    session
        .replay(&scenario(&server.uri())[..1], &ReplayOptions::default())
        .await;

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);

    let request = &received[0];
    assert!(request.headers.get("origin").is_none());
    assert_eq!(
        request.headers.get("x-request-source").unwrap().to_str().unwrap(),
        "request-replay"
    );
    assert_eq!(
        request.headers.get("content-type").unwrap().to_str().unwrap(),
        "application/json"
    );
}

#[tokio::test]
async fn test_http_error_and_stop_on_error() {
    let server = start_api().await;
    let mut steps = vec![Step::new("missing", "GET", format!("{}/missing", server.uri()))];
    steps.extend(scenario(&server.uri()));

    let results = live_session()
        .replay(&steps, &ReplayOptions::default())
        .await;
    assert_eq!(results.len(), 4);
    assert_eq!(results[0].status, StepStatus::Error);
    assert_eq!(
        results[0].error.as_deref(),
        Some("HTTP error: 404 Not Found")
    );
    assert_eq!(
        results[0].response.as_ref().unwrap().body,
        json!("not here")
    );

    let options = ReplayOptions {
        stop_on_error: true,
        ..Default::default()
    };
    let results = live_session().replay(&steps, &options).await;
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_error_on_capture_flags_leaked_value() {
    let server = start_api().await;
    let options = ReplayOptions {
        error_on_capture: true,
        ..Default::default()
    };

    let results = live_session()
        .replay(&scenario(&server.uri())[..1], &options)
        .await;

    assert_eq!(results[0].status, StepStatus::Error);
    let error = results[0].error.as_deref().unwrap();
    assert!(error.starts_with("Error captured variable : "));
    assert!(error.contains(r#"token = "tok-123""#));
}

#[tokio::test]
async fn test_unreachable_get_reports_both_failures() {
    let step = Step::new("down", "GET", "http://127.0.0.1:1/health");

    let results = live_session()
        .replay(&[step], &ReplayOptions::default())
        .await;

    assert_eq!(results[0].status, StepStatus::Error);
    assert!(results[0].response.is_none());
    assert!(results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("reduced-fidelity"));
}

#[tokio::test]
async fn test_tracked_run_persists_progress_and_variables() {
    let server = start_api().await;
    let dir = TempDir::new().unwrap();
    let store_path = dir.path().join("storage.json");

    let mut session = live_session();
    let mut events: Vec<ProgressEvent> = Vec::new();
    {
        let mut store = JsonFileStore::open(&store_path).unwrap();
        let mut file_sink = StoreProgressSink::new(&mut store);
        let mut sink = |event: ProgressEvent| {
            events.push(event.clone());
            file_sink.on_progress(event);
        };

        let steps = scenario(&server.uri());
        session
            .replay_with_tracking(&steps, &ReplayOptions::default(), &mut sink)
            .await;
    }

    let statuses: Vec<ProgressStatus> = events.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            ProgressStatus::InProgress,
            ProgressStatus::Success,
            ProgressStatus::InProgress,
            ProgressStatus::Success,
            ProgressStatus::InProgress,
            ProgressStatus::Success,
            ProgressStatus::Complete,
        ]
    );
    assert!(events.last().unwrap().is_terminal());

    let mut store = JsonFileStore::open(&store_path).unwrap();
    let last = store.get(REPLAY_PROGRESS_KEY).unwrap().unwrap();
    assert_eq!(last["stepIndex"], -1);
    assert_eq!(last["status"], "complete");

    session.variables().save_to(&mut store).unwrap();
    let reopened = JsonFileStore::open(&store_path).unwrap();
    let restored = VariableStore::load_from(&reopened).unwrap();
    assert_eq!(restored.get("token").unwrap().as_text(), "tok-123");
}

#[tokio::test]
async fn test_resumed_session_uses_saved_variables() {
    let server = start_api().await;

    let mut variables = VariableStore::new();
    variables.set("token", "tok-123");
    variables.set("userId", 42i64);

    let mut session = live_session();
    *session.variables_mut() = variables;

    // Only the profile step: its inputs come from the restored store
    let results = session
        .replay(&scenario(&server.uri())[1..2], &ReplayOptions::default())
        .await;

    assert_eq!(
        results[0].status,
        StepStatus::Success,
        "{:?}",
        results[0].error
    );
}
