//! OpenAPI import and replay integration tests
//!
//! These tests load exported recordings from disk, rebase them onto a mock
//! server and replay them.

use super::live_session;
use request_replay::executor::IMPORTED_STATUS_TEXT;
use request_replay::models::StepStatus;
use request_replay::openapi::{self, parse_document};
use request_replay::replay::{common_base_url, ReplayOptions};
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn exported_recording() -> serde_json::Value {
    json!({
        "openapi": "3.0.0",
        "info": {"title": "Recorded session", "version": "1.0.0"},
        "x-ark-replayr": {"type": "recording"},
        "servers": [{"url": "https://prod.example.com"}],
        "paths": {
            "/users/{id}": {
                "get": {
                    "summary": "Load profile",
                    "x-recorded-index": 1,
                    "x-original-url": "https://prod.example.com/users/USER_ID",
                    "parameters": [
                        {"name": "id", "in": "path", "example": "42"},
                        {"name": "Authorization", "in": "header", "example": "Bearer TOKEN"}
                    ],
                    "x-variable-substitution": [
                        {"regex": "USER_ID", "mode": "variable", "targetVariable": "userId"},
                        {"regex": "TOKEN", "mode": "variable", "targetVariable": "token"}
                    ]
                }
            },
            "/login": {
                "post": {
                    "summary": "Sign in",
                    "x-recorded-index": 0,
                    "x-original-url": "https://prod.example.com/login",
                    "requestBody": {
                        "content": {"application/json": {"example": {"user": "alice"}}}
                    },
                    "x-variable-capture": [
                        {"name": "token", "regex": "\"token\":\"([^\"]+)\"", "required": true},
                        {"name": "userId", "regex": "\"userId\":(\\d+)"}
                    ]
                }
            }
        }
    })
}

async fn start_api() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"token": "t-1", "userId": 42})),
        )
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/42"))
        .and(header("authorization", "Bearer t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "alice"})))
        .mount(&server)
        .await;

    server
}

#[tokio::test]
async fn test_replay_imported_recording_on_new_base_url() {
    let server = start_api().await;
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("recording.json");
    let exported = serde_json::to_string_pretty(&exported_recording()).unwrap();
    fs::write(&file, exported).unwrap();

    let steps = parse_document(&fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(steps[0].name, "Sign in");
    assert_eq!(steps[1].name, "Load profile");
    assert_eq!(
        common_base_url(&steps).as_deref(),
        Some("https://prod.example.com")
    );

    let options = ReplayOptions {
        base_url: Some(server.uri()),
        ..Default::default()
    };
    let results = live_session().replay(&steps, &options).await;

    assert_eq!(results.len(), 2);
    for result in &results {
        assert_eq!(result.status, StepStatus::Success, "{:?}", result.error);
    }
    assert_eq!(
        results[1].request.as_ref().unwrap().url,
        format!("{}/users/42", server.uri())
    );
}

#[tokio::test]
async fn test_unreachable_imported_step_gets_limited_response() {
    let doc = json!({
        "openapi": "3.0.0",
        "paths": {
            "/reports/{id}": {
                "delete": {"x-original-url": "http://127.0.0.1:1/reports/3"}
            }
        }
    });
    let steps = openapi::extract_steps(&doc).unwrap();

    let results = live_session()
        .replay(&steps, &ReplayOptions::default())
        .await;

    let response = results[0].response.as_ref().unwrap();
    assert_eq!(results[0].status, StepStatus::Success);
    assert_eq!(response.status, 202);
    assert_eq!(response.status_text, IMPORTED_STATUS_TEXT);
    assert_eq!(response.body["original_path"], "/reports/{id}");
}

#[tokio::test]
async fn test_raw_recording_replays_in_order() {
    let server = start_api().await;
    let doc = json!({
        "openapi": "3.0.0",
        "paths": {},
        "rawRequests": [
            {"method": "POST", "url": format!("{}/login", server.uri()), "body": {"user": "alice"}},
            {"method": "OPTIONS", "url": format!("{}/login", server.uri())}
        ]
    });

    let steps = openapi::extract_steps(&doc).unwrap();
    assert_eq!(steps.len(), 1);

    let results = live_session()
        .replay(&steps, &ReplayOptions::default())
        .await;
    assert_eq!(results[0].status, StepStatus::Success);
    assert_eq!(results[0].response.as_ref().unwrap().body["token"], "t-1");
}
