use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::errors::ApiError;
use crate::services::data_service::{self, AdminStatus, DataItem};
use crate::state::{AppState, MetricsSnapshot, Record};

/// Build all admin routes under /admin.
///
/// Nothing here checks credentials: these routes are only ever mounted on
/// the local socket.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/data", post(set_data))
        .route("/data/all", get(all_data))
        .route("/data/reset", delete(reset_data))
        .route("/record/:key", get(get_record))
        .route("/status", get(status))
        .with_state(state)
}

/// GET /admin/metrics
async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.store.get_metrics().await)
}

//
// ─────────────────────────────────────────────────────────────
// GET /admin/data/all
// Every key, private ones included
// ─────────────────────────────────────────────────────────────
//
async fn all_data(State(state): State<AppState>) -> Json<Value> {
    let data = state.store.get_all().await;
    Json(json!({ "data": data }))
}

//
// ─────────────────────────────────────────────────────────────
// GET /admin/record/{key}
// Single record with timestamps, or 404
// ─────────────────────────────────────────────────────────────
//
async fn get_record(
    Path(key): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Record>, ApiError> {
    match state.store.get(&key).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(ApiError::NotFound(format!("No record for key {key}"))),
        Err(err) => Err(ApiError::Internal(format!("Failed to read store: {err}"))),
    }
}

//
// ─────────────────────────────────────────────────────────────
// POST /admin/data
// Unrestricted write
// ─────────────────────────────────────────────────────────────
//
async fn set_data(
    State(state): State<AppState>,
    payload: Result<Json<DataItem>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(item) = payload?;
    let message = data_service::admin_set(&state.store, &item).await?;
    Ok(Json(json!({ "message": message })))
}

//
// ─────────────────────────────────────────────────────────────
// DELETE /admin/data/reset
// Remove every record (destructive); metrics are kept
// ─────────────────────────────────────────────────────────────
//
async fn reset_data(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .store
        .reset()
        .await
        .map_err(|err| ApiError::Internal(format!("Failed to reset data: {err}")))?;
    Ok(Json(json!({ "message": "All data reset" })))
}

/// GET /admin/status
async fn status(State(state): State<AppState>) -> Result<Json<AdminStatus>, ApiError> {
    Ok(Json(data_service::admin_status(&state.store).await?))
}
