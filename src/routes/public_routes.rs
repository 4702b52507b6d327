use axum::{
    extract::{rejection::JsonRejection, State},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use crate::errors::ApiError;
use crate::services::data_service::{self, DataItem};
use crate::state::AppState;

/// Build the world-facing data routes.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/data", get(get_data).post(set_data))
        .with_state(state)
}

/// GET /
async fn root() -> Json<Value> {
    Json(json!({ "status": "ok", "api": "public" }))
}

//
// ─────────────────────────────────────────────────────────────
// GET /data
// Public keys only; private keys never leave this surface
// ─────────────────────────────────────────────────────────────
//
async fn get_data(State(state): State<AppState>) -> Json<Value> {
    let data = data_service::public_data(&state.store).await;
    Json(json!({ "data": data }))
}

//
// ─────────────────────────────────────────────────────────────
// POST /data
// 403 for private keys, 500 when the store gives up
// ─────────────────────────────────────────────────────────────
//
async fn set_data(
    State(state): State<AppState>,
    payload: Result<Json<DataItem>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(item) = payload?;
    let message = data_service::public_set(&state.store, &item).await?;
    Ok(Json(json!({ "message": message })))
}
