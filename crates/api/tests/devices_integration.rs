//! Integration tests for device registration, removal and verification.

mod common;

use axum::http::{Method, StatusCode};
use common::{get_request, json_request, register_via_sync, with_session, TestApp};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_register_device_makes_it_the_only_active_one() {
    let app = TestApp::new();
    app.store.insert_account(1, Some("alice"));
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    for device_id in [first, second] {
        let (status, response) = app
            .send_json(json_request(
                Method::POST,
                "/api/v1/devices",
                json!({"deviceId": device_id, "accountId": 1}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["success"], true);
        assert_eq!(response["message"], "Device registered successfully");
        assert_eq!(response["device"]["deviceId"], device_id.to_string());
        assert_eq!(response["device"]["isActive"], true);
        assert_eq!(response["device"]["deviceName"], "Chrome 120.0 on Mac");
    }

    assert!(!app.store.device(first).unwrap().is_active());
    assert!(app.store.device(second).unwrap().is_active());
    assert_eq!(app.store.account(1).unwrap().active_device_id, Some(second));
}

#[tokio::test]
async fn test_register_device_legacy_paths_and_aliases() {
    let app = TestApp::new();
    app.store.insert_account(1, Some("alice"));

    for path in ["/api/devices/register", "/api/extension/devices"] {
        let device_id = Uuid::new_v4();
        let (status, _) = app
            .send_json(json_request(
                Method::POST,
                path,
                json!({"deviceUuid": device_id, "userId": 1}),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "{path}");
        assert!(app.store.device(device_id).unwrap().is_active());
    }
}

#[tokio::test]
async fn test_register_device_for_unknown_account() {
    let app = TestApp::new();
    let device_id = Uuid::new_v4();

    let (status, response) = app
        .send_json(json_request(
            Method::POST,
            "/api/v1/devices",
            json!({"deviceId": device_id, "accountId": 7}),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        response["error"],
        "User 7 does not exist. Please ensure you are logged in properly."
    );
    assert!(app.store.device(device_id).is_none());
}

#[tokio::test]
async fn test_register_device_rejects_non_positive_account() {
    let app = TestApp::new();

    let (status, response) = app
        .send_json(json_request(
            Method::POST,
            "/api/v1/devices",
            json!({"deviceId": Uuid::new_v4(), "accountId": 0}),
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "validation_error");
}

#[tokio::test]
async fn test_register_device_write_failure_is_server_error() {
    let app = TestApp::new();
    app.store.insert_account(1, Some("alice"));
    app.store.fail_device_writes(true);

    let (status, response) = app
        .send_json(json_request(
            Method::POST,
            "/api/v1/devices",
            json!({"deviceId": Uuid::new_v4(), "accountId": 1}),
        ))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response["success"], false);
}

#[tokio::test]
async fn test_list_devices_requires_session() {
    let app = TestApp::new();

    let (status, response) = app.send_json(get_request("/api/v1/devices")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"], "No session found");

    let (status, response) = app
        .send_json(with_session(get_request("/api/v1/devices"), "bogus"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["error"], "Invalid or expired session");
}

#[tokio::test]
async fn test_list_devices_shows_only_own() {
    let app = TestApp::new();
    let token = app.account_with_session(1, "alice");
    app.store.insert_account(2, Some("bob"));
    let old = Uuid::new_v4();
    let current = Uuid::new_v4();
    register_via_sync(&app, old, 1).await;
    register_via_sync(&app, current, 1).await;
    register_via_sync(&app, Uuid::new_v4(), 2).await;

    let (status, response) = app
        .send_json(with_session(get_request("/api/v1/devices"), &token))
        .await;

    assert_eq!(status, StatusCode::OK);
    let devices = response["devices"].as_array().unwrap();
    assert_eq!(devices.len(), 2);
    let active: Vec<_> = devices
        .iter()
        .filter(|d| d["isActive"] == true)
        .map(|d| d["deviceId"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(active, vec![current.to_string()]);
    assert!(devices
        .iter()
        .any(|d| d["deviceId"] == old.to_string() && !d["deactivatedAt"].is_null()));
}

#[tokio::test]
async fn test_remove_device_deactivates_or_purges() {
    let app = TestApp::new();
    app.store.insert_account(1, Some("alice"));
    let device_id = Uuid::new_v4();
    register_via_sync(&app, device_id, 1).await;

    let (status, response) = app
        .send_json(json_request(
            Method::DELETE,
            "/api/v1/devices",
            json!({"deviceId": device_id}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["message"], "Device deactivated successfully");
    assert!(!app.store.device(device_id).unwrap().is_active());

    let (status, response) = app
        .send_json(json_request(
            Method::DELETE,
            "/api/extension/devices",
            json!({"deviceUuid": device_id, "purge": true}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["message"], "Device removed permanently");
    assert!(app.store.device(device_id).is_none());
}

#[tokio::test]
async fn test_verify_device() {
    let app = TestApp::new();
    app.store.insert_account(1, Some("alice"));
    let device_id = Uuid::new_v4();

    let uri = format!("/api/v1/device/verify?deviceId={device_id}");
    let (status, response) = app.send_json(get_request(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["verified"], false);
    assert_eq!(response["message"], "Device not registered");
    assert!(response.get("device").is_none());

    register_via_sync(&app, device_id, 1).await;
    let (_, response) = app.send_json(get_request(&uri)).await;
    assert_eq!(response["verified"], true);
    assert_eq!(response["isActive"], true);
    assert_eq!(response["message"], "Device is active and verified");
    assert_eq!(response["device"]["userId"], 1);
    assert_eq!(response["user"]["username"], "alice");

    register_via_sync(&app, Uuid::new_v4(), 1).await;
    let (_, response) = app.send_json(get_request(&uri)).await;
    assert_eq!(response["verified"], false);
    assert_eq!(response["message"], "Device is registered but not active");
}

#[tokio::test]
async fn test_verify_device_requires_valid_id() {
    let app = TestApp::new();
    let (status, response) = app
        .send_json(get_request("/api/v1/device/verify?deviceId=nope"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["code"], "bad_request");
}

#[tokio::test]
async fn test_verify_device_sync_reports_recent_sync() {
    let app = TestApp::new();
    app.store.insert_account(1, Some("alice"));
    let device_id = Uuid::new_v4();

    let (_, response) = app
        .send_json(json_request(
            Method::POST,
            "/api/v1/device/verify",
            json!({"deviceId": device_id}),
        ))
        .await;
    assert_eq!(response["verified"], false);
    assert_eq!(response["hasRecentSync"], false);
    assert!(response["userId"].is_null());

    register_via_sync(&app, device_id, 1).await;
    let (status, response) = app
        .send_json(json_request(
            Method::POST,
            "/api/v1/device/verify",
            json!({"deviceId": device_id}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["verified"], true);
    assert_eq!(response["hasRecentSync"], true);
    assert!(!response["lastSyncAt"].is_null());
    assert_eq!(response["userId"], 1);
}

#[tokio::test]
async fn test_device_status() {
    let app = TestApp::new();
    app.store.insert_account(1, Some("alice"));
    let device_id = Uuid::new_v4();

    let (status, response) = app
        .send_json(json_request(
            Method::POST,
            "/api/v1/device/status",
            json!({"deviceId": device_id}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"connected": false}));

    register_via_sync(&app, device_id, 1).await;
    let (_, response) = app
        .send_json(json_request(
            Method::POST,
            "/api/v1/device/status",
            json!({"deviceId": device_id}),
        ))
        .await;
    assert_eq!(response, json!({"connected": true, "userId": 1}));
}

#[tokio::test]
async fn test_purged_device_cannot_be_registered_again() {
    let app = TestApp::new();
    app.store.insert_account(1, Some("alice"));
    let device_id = Uuid::new_v4();
    register_via_sync(&app, device_id, 1).await;

    let (status, _) = app
        .send_json(json_request(
            Method::DELETE,
            "/api/v1/devices",
            json!({"deviceId": device_id, "purge": true}),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, response) = app
        .send_json(json_request(
            Method::POST,
            "/api/v1/devices",
            json!({"deviceId": device_id, "accountId": 1}),
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(response["code"], "conflict");
    assert!(app.store.device(device_id).is_none());
    assert_eq!(app.store.account(1).unwrap().active_device_id, None);
}
