use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};

use crate::state::AppState;

/// Liveness and readiness probes for the public listener.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
        .route("/health/live", get(live))
        .with_state(state)
}

/// GET /health
///
/// Reads metrics without counting as a request.
async fn health(State(state): State<AppState>) -> Json<Value> {
    let metrics = state.store.get_metrics().await;
    Json(json!({
        "status": "healthy",
        "uptime": metrics.uptime_started_at,
    }))
}

/// GET /health/ready
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ready", "service": &*state.service_name })),
        ),
        Err(err) => {
            tracing::warn!("readiness check failed: {err}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "service": &*state.service_name })),
            )
        }
    }
}

/// GET /health/live
async fn live(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "alive", "service": &*state.service_name }))
}
