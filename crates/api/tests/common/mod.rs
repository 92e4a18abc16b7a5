//! Shared fixtures for API integration tests.
//!
//! The router runs over `InMemoryStore`, so these tests need no database.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use cribble_api::{app::create_app, config::Config};
use domain::memory::InMemoryStore;
use domain::ports::Stores;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const CLEANUP_TOKEN: &str = "confirm-cleanup";
pub const CHROME_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Rate limiting off, cleanup enabled.
pub fn test_config() -> Config {
    Config::from_overrides(&[
        ("database.url", "postgres://unused@localhost/cribble_test"),
        ("security.rate_limit.enabled", "false"),
        ("admin.cleanup_token", CLEANUP_TOKEN),
    ])
    .expect("test config")
}

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let router = create_app(config, Stores::from_backend(store.clone()), None);
        Self { store, router }
    }

    /// Adds an account with an unexpired session and returns the token.
    pub fn account_with_session(&self, account_id: i64, username: &str) -> String {
        self.store.insert_account(account_id, Some(username));
        let token = format!("session-{account_id}-{}", Uuid::new_v4());
        self.store
            .insert_session(&token, account_id, Utc::now() + Duration::days(1));
        token
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.send(request).await;
        let status = response.status();
        (status, parse_response_body(response).await)
    }
}

pub async fn parse_response_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(
        String::from_utf8_lossy(&bytes).into_owned(),
    ))
}

pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, CHROME_UA)
        .body(Body::from(body.to_string()))
        .expect("request")
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

pub fn with_session(mut request: Request<Body>, token: &str) -> Request<Body> {
    request.headers_mut().insert(
        header::COOKIE,
        format!("cribble_session={token}").parse().expect("cookie header"),
    );
    request
}

/// A visit event `offset_secs` in the past.
pub fn visit(domain: &str, offset_secs: i64, duration_ms: Option<u64>) -> Value {
    let timestamp = (Utc::now() - Duration::seconds(offset_secs)).timestamp_millis();
    let mut event = json!({
        "type": "visit",
        "domain": domain,
        "timestamp": timestamp,
    });
    if let Some(duration) = duration_ms {
        event["duration"] = json!(duration);
    }
    event
}

pub fn sync_body(device_id: Uuid, account_id: Option<i64>, events: Vec<Value>) -> Value {
    let mut body = json!({
        "deviceId": device_id,
        "events": events,
        "batchId": format!("batch-{}", Uuid::new_v4()),
    });
    if let Some(account_id) = account_id {
        body["accountId"] = json!(account_id);
    }
    body
}

/// Registers `device_id` for `account_id` through the sync endpoint.
pub async fn register_via_sync(app: &TestApp, device_id: Uuid, account_id: i64) {
    let (status, body) = app
        .send_json(json_request(
            Method::POST,
            "/api/v1/sync",
            sync_body(device_id, Some(account_id), vec![]),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "registration failed: {body}");
}
