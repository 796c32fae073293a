//! HTTP API for the Worklog Engine.
//!
//! This module exposes the remuneration engine, the work-record ledger
//! and the license state machine over a small REST API built with
//! [`axum`](https://crates.io/crates/axum).  All state lives in one
//! [`AppState`] built at start-up and shared by every handler.
//!
//! The identity provider is stubbed: a request carrying
//! `x-system-admin: true` is treated as coming from the system
//! administrator, everything else as an ordinary user.

use crate::clock::{Clock, SystemClock};
use crate::config::{LicenseConfigPatch, Settings};
use crate::encoding::TextEncoding;
use crate::engine::{compute_batch, compute_prorated, compute_total, EngineError};
use crate::identity::Principal;
use crate::license::countdown::format_time_left;
use crate::license::registry::LicenseRequest;
use crate::license::{Access, CountdownTimer, LicenseError, LicenseManager, LicenseState};
use crate::models::WorkEntry;
use crate::records::{RecordError, WorkRecordStore};
use crate::reports::summarize;
use crate::roles::{RoleDraft, RoleError, RolePatch};
use crate::storage::{FileStore, KeyValueStore};
use crate::validation::{validate_work_entry, ValidationError};
use anyhow::{Context, Result};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Application state shared across requests.
pub struct AppState {
    pub clock: Arc<dyn Clock>,
    pub license: Arc<Mutex<LicenseManager>>,
    pub records: RwLock<WorkRecordStore>,
    pub timer: Mutex<Option<CountdownTimer>>,
    pub tick_period: Duration,
}

impl AppState {
    /// Builds the state around an already constructed license manager.
    pub fn new(license: LicenseManager, clock: Arc<dyn Clock>, tick_period: Duration) -> Self {
        Self {
            clock,
            license: Arc::new(Mutex::new(license)),
            records: RwLock::new(WorkRecordStore::new()),
            timer: Mutex::new(None),
            tick_period,
        }
    }

    /// Makes the background countdown match the license: running while a
    /// demo is active, stopped otherwise.
    pub async fn sync_timer(&self) {
        let active = self.license.lock().await.countdown_active();
        let mut timer = self.timer.lock().await;
        if active {
            if timer.as_ref().map_or(true, CountdownTimer::is_finished) {
                *timer = Some(CountdownTimer::spawn(self.license.clone(), self.tick_period));
            }
        } else if let Some(running) = timer.take() {
            running.cancel().await;
        }
    }

    /// Stops the countdown task.  Called on shutdown.
    pub async fn shutdown(&self) {
        if let Some(running) = self.timer.lock().await.take() {
            running.cancel().await;
        }
    }
}

/// Opens storage under `settings.data_dir`, restores the license and
/// starts the countdown if a demo is running.
pub async fn build_state(settings: &Settings) -> Result<Arc<AppState>> {
    let files = FileStore::open(&settings.data_dir)
        .with_context(|| format!("opening data directory {}", settings.data_dir.display()))?;
    tracing::info!(dir = %files.dir().display(), "storage opened");
    let store: Arc<dyn KeyValueStore> = Arc::new(files);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut manager = LicenseManager::new(store, clock.clone())
        .with_encoding(TextEncoding::new(settings.encode_stored_keys));
    if let Some(key) = &settings.lifetime_key_override {
        manager.override_lifetime_key(key.clone());
    }
    let restored = manager.restore();
    tracing::info!(mode = ?restored.mode, "license state restored");

    let state = Arc::new(AppState::new(manager, clock, settings.tick_period));
    state.sync_timer().await;
    Ok(state)
}

/// Build the API router over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/remuneration/total", post(total_handler))
        .route("/api/remuneration/prorated", post(prorated_handler))
        .route("/api/remuneration/batch", post(batch_handler))
        .route("/api/work-entries/validate", post(validate_handler))
        .route("/api/records", get(list_records).post(add_record))
        .route("/api/records/export", get(export_records))
        .route("/api/records/:id", put(update_record).delete(delete_record))
        .route("/api/reports/summary", get(summary_handler))
        .route("/api/license", get(license_status).delete(clear_license))
        .route("/api/license/activate", post(activate_license))
        .route("/api/license/reset-demo", post(reset_demo))
        .route("/api/license/config", get(get_config).put(update_config))
        .route("/api/license/config/reset", post(reset_config))
        .route("/api/license/users", get(list_licensed_users).post(issue_license))
        .route("/api/license/users/:id", delete(delete_licensed_user))
        .route("/api/license/users/:id/toggle-status", post(toggle_license_status))
        .route("/api/license/users/:id/regenerate", post(regenerate_license))
        .route("/api/license/expiring-users", get(expiring_licenses))
        .route("/api/roles", get(list_roles).post(create_role))
        .route("/api/roles/:id", put(update_role).delete(delete_role))
        .with_state(state)
}

/// Errors surfaced to HTTP clients as `{"error": ...}` bodies.
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Engine(EngineError),
    License(LicenseError),
    Role(RoleError),
    NotFound(String),
    Forbidden(&'static str),
}

impl From<RecordError> for ApiError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::Validation(e) => Self::Validation(e),
            RecordError::Engine(e) => Self::Engine(e),
            RecordError::NotFound(id) => Self::NotFound(id),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        Self::License(err)
    }
}

impl From<RoleError> for ApiError {
    fn from(err: RoleError) -> Self {
        Self::Role(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({"error": "validation failed", "errors": e.errors}),
            ),
            ApiError::Engine(e @ EngineError::InvalidInput(_)) => {
                (StatusCode::BAD_REQUEST, json!({"error": e.to_string()}))
            }
            ApiError::Engine(e @ EngineError::DivisionByZero) => {
                tracing::error!(error = %e, "engine contract violated");
                (StatusCode::INTERNAL_SERVER_ERROR, json!({"error": e.to_string()}))
            }
            ApiError::License(e @ LicenseError::UnknownUser(_)) => {
                (StatusCode::NOT_FOUND, json!({"error": e.to_string()}))
            }
            ApiError::License(e) => (StatusCode::BAD_REQUEST, json!({"error": e.to_string()})),
            ApiError::Role(e) => {
                let status = match e {
                    RoleError::NotFound(_) => StatusCode::NOT_FOUND,
                    RoleError::SystemRole(_) | RoleError::DuplicateName(_) => StatusCode::CONFLICT,
                    RoleError::EmptyName => StatusCode::BAD_REQUEST,
                };
                (status, json!({"error": e.to_string()}))
            }
            ApiError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                json!({"error": format!("work record `{id}` not found")}),
            ),
            ApiError::Forbidden(feature) => (
                StatusCode::FORBIDDEN,
                json!({"error": format!("license does not allow `{feature}`")}),
            ),
        };
        (status, Json(body)).into_response()
    }
}

fn principal(headers: &HeaderMap) -> Option<Principal> {
    let admin = headers
        .get("x-system-admin")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    admin.then(|| Principal::system_admin("system-admin", "System Administrator", "admin@localhost"))
}

async fn require_feature(state: &AppState, headers: &HeaderMap, feature: &'static str) -> Result<(), ApiError> {
    let who = principal(headers);
    if state.license.lock().await.has_feature(who.as_ref(), feature) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(feature))
    }
}

fn require_admin(headers: &HeaderMap, feature: &'static str) -> Result<(), ApiError> {
    match principal(headers) {
        Some(p) if p.is_system_admin => Ok(()),
        _ => Err(ApiError::Forbidden(feature)),
    }
}

/// Handler for POST /api/remuneration/total
async fn total_handler(Json(entry): Json<WorkEntry>) -> Result<Json<serde_json::Value>, ApiError> {
    let base_total = compute_total(&entry)?;
    Ok(Json(json!({ "base_total": base_total })))
}

/// Handler for POST /api/remuneration/prorated
async fn prorated_handler(Json(entry): Json<WorkEntry>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(compute_prorated(&entry)?))
}

/// Handler for POST /api/remuneration/batch.  One slot per entry, in
/// order: either the split or `{"error": ...}`.
async fn batch_handler(Json(entries): Json<Vec<WorkEntry>>) -> impl IntoResponse {
    let results: Vec<serde_json::Value> = compute_batch(&entries)
        .into_iter()
        .map(|r| match r {
            Ok(split) => json!(split),
            Err(e) => json!({ "error": e.to_string() }),
        })
        .collect();
    Json(results)
}

/// Handler for POST /api/work-entries/validate
async fn validate_handler(State(app): State<Arc<AppState>>, Json(entry): Json<WorkEntry>) -> impl IntoResponse {
    Json(validate_work_entry(&entry, app.clock.today()))
}

async fn list_records(State(app): State<Arc<AppState>>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    require_feature(&app, &headers, "basic_crud").await?;
    let records = app.records.read().await;
    Ok(Json(records.list().to_vec()))
}

async fn add_record(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(entry): Json<WorkEntry>,
) -> Result<impl IntoResponse, ApiError> {
    require_feature(&app, &headers, "basic_crud").await?;
    let mut records = app.records.write().await;
    let record = records.add(entry, app.clock.now())?.clone();
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_record(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(entry): Json<WorkEntry>,
) -> Result<impl IntoResponse, ApiError> {
    require_feature(&app, &headers, "basic_crud").await?;
    let mut records = app.records.write().await;
    let record = records.update(&id, entry, app.clock.now())?.clone();
    Ok(Json(record))
}

async fn delete_record(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_feature(&app, &headers, "basic_crud").await?;
    app.records.write().await.delete(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn export_records(State(app): State<Arc<AppState>>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    require_feature(&app, &headers, "reports").await?;
    let csv = app.records.read().await.export_csv();
    let disposition = format!(
        "attachment; filename=\"work-records-{}.csv\"",
        app.clock.today()
    );
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    ))
}

async fn summary_handler(State(app): State<Arc<AppState>>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    require_feature(&app, &headers, "reports").await?;
    let records = app.records.read().await;
    Ok(Json(summarize(records.list())))
}

#[derive(Debug, Serialize)]
struct LicenseView {
    #[serde(flatten)]
    state: LicenseState,
    access: Access,
    /// Full or lifetime license in place.
    licensed: bool,
    /// `H:MM:SS` / `M:SS` while a demo is running.
    time_left_display: Option<String>,
}

async fn license_view(app: &AppState, headers: &HeaderMap) -> LicenseView {
    let who = principal(headers);
    let manager = app.license.lock().await;
    let state = manager.state();
    let access = manager.access(who.as_ref());
    let time_left_display = match access {
        Access::Demo { time_left_seconds } => Some(format_time_left(time_left_seconds)),
        _ => None,
    };
    LicenseView {
        licensed: state.mode.is_licensed(),
        state,
        access,
        time_left_display,
    }
}

async fn license_status(State(app): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    Json(license_view(&app, &headers).await)
}

#[derive(Debug, Deserialize)]
struct ActivateRequest {
    key: String,
}

async fn activate_license(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ActivateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    app.license.lock().await.activate(req.key.trim())?;
    app.sync_timer().await;
    Ok(Json(license_view(&app, &headers).await))
}

async fn reset_demo(State(app): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    app.license.lock().await.reset_demo();
    app.sync_timer().await;
    Json(license_view(&app, &headers).await)
}

async fn clear_license(State(app): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    app.license.lock().await.clear_license();
    app.sync_timer().await;
    Json(license_view(&app, &headers).await)
}

async fn get_config(State(app): State<Arc<AppState>>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, "license_config")?;
    Ok(Json(app.license.lock().await.config().clone()))
}

async fn update_config(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(patch): Json<LicenseConfigPatch>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, "license_config")?;
    let config = app.license.lock().await.update_config(patch).clone();
    Ok(Json(config))
}

async fn reset_config(State(app): State<Arc<AppState>>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, "license_config")?;
    let config = app.license.lock().await.reset_config().clone();
    Ok(Json(config))
}

async fn list_licensed_users(State(app): State<Arc<AppState>>, headers: HeaderMap) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, "user_management")?;
    Ok(Json(app.license.lock().await.licensed_users()))
}

async fn issue_license(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LicenseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, "user_management")?;
    let user = app.license.lock().await.issue_license(request, "system-admin")?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn toggle_license_status(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, "user_management")?;
    let user = app.license.lock().await.toggle_license_status(&id)?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
struct RegenerateRequest {
    /// Validity in months.
    duration: u32,
}

async fn regenerate_license(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<RegenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, "user_management")?;
    let user = app.license.lock().await.regenerate_license(&id, req.duration)?;
    Ok(Json(user))
}

async fn delete_licensed_user(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, "user_management")?;
    app.license.lock().await.delete_licensed_user(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ExpiringQuery {
    days: Option<u32>,
}

/// Handler for GET /api/license/expiring-users?days=N (default 90).
async fn expiring_licenses(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ExpiringQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, "user_management")?;
    let users = app.license.lock().await.expiring_licenses(query.days.unwrap_or(90));
    Ok(Json(users))
}

async fn list_roles(State(app): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    let who = principal(&headers);
    Json(app.license.lock().await.roles(who.as_ref()))
}

async fn create_role(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<RoleDraft>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, "role_management")?;
    let role = app.license.lock().await.create_role(draft)?;
    Ok((StatusCode::CREATED, Json(role)))
}

async fn update_role(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(patch): Json<RolePatch>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, "role_management")?;
    let role = app.license.lock().await.update_role(&id, patch)?;
    Ok(Json(role))
}

async fn delete_role(
    State(app): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&headers, "role_management")?;
    app.license.lock().await.delete_role(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Launch the API server.  Builds the state from `settings`, binds to
/// the configured address and runs until Ctrl-C, then stops the
/// countdown task.
pub async fn serve(settings: Settings) -> Result<()> {
    let state = build_state(&settings).await?;
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("binding {}", settings.bind_addr))?;
    tracing::info!(addr = %settings.bind_addr, "server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;
    state.shutdown().await;
    Ok(())
}
