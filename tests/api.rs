//! End-to-end tests against the axum router.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use worklog_engine::api::{router, AppState};
use worklog_engine::clock::ManualClock;
use worklog_engine::license::LicenseManager;
use worklog_engine::storage::MemoryStore;

fn app() -> (Router, Arc<AppState>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()));
    let manager = LicenseManager::new(Arc::new(MemoryStore::new()), clock.clone());
    let state = Arc::new(AppState::new(manager, clock.clone(), Duration::from_secs(1)));
    (router(state.clone()), state, clock)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>, admin: bool) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if admin {
        req = req.header("x-system-admin", "true");
    }
    let req = match body {
        Some(v) => req
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn entry(hours: f64, rate: f64, extra: f64, collaborators: Value) -> Value {
    json!({
        "employee_name": "Ahmad Fauzi",
        "task_description": "Integrate the payment gateway callbacks",
        "date": "2025-05-30",
        "primary_hours": hours,
        "hourly_rate": rate,
        "additional_charges": extra,
        "collaborators": collaborators,
    })
}

#[tokio::test]
async fn remuneration_endpoints() {
    let (app, _, _) = app();

    let (status, body) = call(&app, "POST", "/api/remuneration/total", Some(entry(8.0, 150000.0, 50000.0, json!([]))), false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["base_total"], 1_250_000.0);

    let split = entry(6.0, 100000.0, 0.0, json!([{"name": "B", "contributed_hours": 2.0}]));
    let (status, body) = call(&app, "POST", "/api/remuneration/prorated", Some(split), false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["primary_share"], 450_000.0);
    assert_eq!(body["collaborator_shares"][0]["share"], 150_000.0);

    let (status, _) = call(&app, "POST", "/api/remuneration/total", Some(entry(0.0, 1.0, 0.0, json!([]))), false).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let batch = json!([entry(2.0, 100.0, 0.0, json!([])), entry(0.0, 100.0, 0.0, json!([]))]);
    let (status, body) = call(&app, "POST", "/api/remuneration/batch", Some(batch), false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["base_total"], 200.0);
    assert!(body[1]["error"].is_string());
}

#[tokio::test]
async fn validation_endpoint_lists_all_errors() {
    let (app, _, _) = app();
    let bad = entry(30.0, 100.0, -1.0, json!([{"name": "B", "contributed_hours": 20.0}]));
    let (status, body) = call(&app, "POST", "/api/work-entries/validate", Some(bad), false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert_eq!(body["errors"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn records_are_locked_until_licensed() {
    let (app, state, _) = app();
    let (status, _) = call(&app, "GET", "/api/records", None, false).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The system administrator is never gated.
    let (status, _) = call(&app, "GET", "/api/records", None, true).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&app, "POST", "/api/license/activate", Some(json!({"key": "DEMO-KEY-12345"})), false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "demo");
    assert_eq!(body["access"]["level"], "demo");
    assert_eq!(body["time_left_display"], "1:00:00");
    assert!(state.timer.lock().await.is_some());

    let (status, body) = call(&app, "POST", "/api/records", Some(entry(8.0, 150000.0, 50000.0, json!([]))), false).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["total_remuneration"], 1_250_000.0);
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body) = call(&app, "PUT", &format!("/api/records/{id}"), Some(entry(4.0, 100000.0, 0.0, json!([]))), false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_remuneration"], 400_000.0);

    let (status, body) = call(&app, "GET", "/api/reports/summary", None, false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["record_count"], 1);

    let (status, _) = call(&app, "DELETE", &format!("/api/records/{id}"), None, false).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "DELETE", &format!("/api/records/{id}"), None, false).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_records_return_every_error() {
    let (app, _, _) = app();
    call(&app, "POST", "/api/license/activate", Some(json!({"key": "LIC-PEGAWAI-2025-TEST"})), false).await;

    let mut bad = entry(8.0, 0.0, 0.0, json!([]));
    bad["task_description"] = json!("short");
    let (status, body) = call(&app, "POST", "/api/records", Some(bad), false).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn bad_key_keeps_previous_license() {
    let (app, _, _) = app();
    call(&app, "POST", "/api/license/activate", Some(json!({"key": "LIC-PEGAWAI-2025-TEST"})), false).await;

    let (status, body) = call(&app, "POST", "/api/license/activate", Some(json!({"key": "garbage"})), false).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid license key format");

    let (_, body) = call(&app, "GET", "/api/license", None, false).await;
    assert_eq!(body["mode"], "full");
    assert_eq!(body["licensed"], true);
    assert_eq!(body["access"]["level"], "unrestricted");
}

#[tokio::test]
async fn reset_demo_stops_the_timer() {
    let (app, state, _) = app();
    call(&app, "POST", "/api/license/activate", Some(json!({"key": "DEMO-KEY-12345"})), false).await;
    assert!(state.timer.lock().await.is_some());

    let (status, body) = call(&app, "POST", "/api/license/reset-demo", None, false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "unlicensed");
    assert!(state.timer.lock().await.is_none());
}

#[tokio::test]
async fn config_requires_the_administrator() {
    let (app, _, _) = app();
    let (status, _) = call(&app, "GET", "/api/license/config", None, false).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, "PUT", "/api/license/config", Some(json!({"demoDuration": 60})), true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["demoDuration"], 60);

    let (_, body) = call(&app, "POST", "/api/license/activate", Some(json!({"key": "DEMO-KEY-12345"})), false).await;
    assert_eq!(body["demo"]["duration_seconds"], 60);
    assert_eq!(body["time_left_display"], "1:00");
}

#[tokio::test]
async fn csv_export() {
    let (app, _, _) = app();
    call(&app, "POST", "/api/records", Some(entry(2.0, 100.0, 0.0, json!([]))), true).await;

    let req = Request::builder()
        .uri("/api/records/export")
        .header("x-system-admin", "true")
        .body(Body::empty())
        .unwrap();
    let res = app.oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/csv; charset=utf-8");
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(text.lines().count(), 2);
}

#[tokio::test]
async fn issued_license_activates_as_full() {
    let (app, _, clock) = app();
    let request = json!({
        "username": "sari",
        "email": "sari@company.com",
        "fullName": "Sari Lestari",
        "duration": 1,
        "licenseType": "full",
        "role": "employee",
    });
    let (status, _) = call(&app, "POST", "/api/license/users", Some(request.clone()), false).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, user) = call(&app, "POST", "/api/license/users", Some(request), true).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user["licenseStatus"], "active");
    let key = user["licenseKey"].as_str().unwrap().to_string();

    let (status, body) = call(&app, "POST", "/api/license/activate", Some(json!({"key": key})), false).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "full");
    assert!(body["expires_at"].is_string());

    clock.advance_secs(60 * 24 * 3600);
    let (_, body) = call(&app, "GET", "/api/license", None, false).await;
    assert_eq!(body["access"]["level"], "locked");
    let (_, users) = call(&app, "GET", "/api/license/users", None, true).await;
    assert_eq!(users[0]["licenseStatus"], "expired");
}

fn license_request(role: &str) -> Value {
    json!({
        "username": "yusuf",
        "email": "yusuf@company.com",
        "fullName": "Yusuf Hakim",
        "duration": 2,
        "licenseType": "full",
        "role": role,
    })
}

#[tokio::test]
async fn licensed_user_administration() {
    let (app, _, _) = app();
    let (_, user) = call(&app, "POST", "/api/license/users", Some(license_request("employee")), true).await;
    let id = user["id"].as_str().unwrap().to_string();

    let (status, _) = call(&app, "GET", "/api/license/expiring-users", None, false).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (_, expiring) = call(&app, "GET", "/api/license/expiring-users", None, true).await;
    assert_eq!(expiring.as_array().unwrap().len(), 1);
    let (_, expiring) = call(&app, "GET", "/api/license/expiring-users?days=7", None, true).await;
    assert!(expiring.as_array().unwrap().is_empty());

    let (status, body) = call(&app, "POST", &format!("/api/license/users/{id}/toggle-status"), None, true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["licenseStatus"], "suspended");
    let key = user["licenseKey"].clone();
    let (status, _) = call(&app, "POST", "/api/license/activate", Some(json!({"key": key})), false).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&app, "POST", &format!("/api/license/users/{id}/regenerate"), Some(json!({"duration": 12})), true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["licenseStatus"], "active");
    assert_ne!(body["licenseKey"], user["licenseKey"]);

    let (status, _) = call(&app, "DELETE", &format!("/api/license/users/{id}"), None, true).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "DELETE", &format!("/api/license/users/{id}"), None, true).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn custom_roles() {
    let (app, _, _) = app();
    let draft = json!({"name": "auditor", "displayName": "Auditor", "permissions": ["reports_read"]});

    let (status, _) = call(&app, "POST", "/api/roles", Some(draft.clone()), false).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "POST", "/api/license/users", Some(license_request("auditor")), true).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, role) = call(&app, "POST", "/api/roles", Some(draft.clone()), true).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(role["isSystemRole"], false);
    let id = role["id"].as_str().unwrap().to_string();
    let (status, _) = call(&app, "POST", "/api/roles", Some(draft), true).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app, "POST", "/api/license/users", Some(license_request("auditor")), true).await;
    assert_eq!(status, StatusCode::CREATED);

    let (_, visible) = call(&app, "GET", "/api/roles", None, false).await;
    assert_eq!(visible.as_array().unwrap().len(), 3);
    let (_, all) = call(&app, "GET", "/api/roles", None, true).await;
    assert_eq!(all.as_array().unwrap().len(), 4);

    let (status, body) = call(&app, "PUT", &format!("/api/roles/{id}"), Some(json!({"displayName": "Internal auditor"})), true).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["displayName"], "Internal auditor");

    let (status, _) = call(&app, "DELETE", "/api/roles/admin", None, true).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = call(&app, "DELETE", &format!("/api/roles/{id}"), None, true).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "DELETE", &format!("/api/roles/{id}"), None, true).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
