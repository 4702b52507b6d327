use axum::http::HeaderValue;
use axum::Router;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::AppConfig;
use crate::routes::{admin_routes, health_routes, public_routes};
use crate::state::AppState;

/// Build the network-facing application:
/// - /          (status probe)
/// - /data      (public keys only)
/// - /health/*  (uptime, readiness, liveness)
///
/// CORS is applied here and nowhere else.
pub fn build_public_app(state: AppState, cfg: &AppConfig) -> Router {
    let app = Router::new()
        .merge(public_routes::routes(state.clone()))
        .merge(health_routes::routes(state))
        .layer(trace_layer());

    match cfg.cors_origins().and_then(cors_layer) {
        Some(cors) => app.layer(cors),
        None => app,
    }
}

/// Build the local-only application:
/// - /          (status probe)
/// - /admin/*   (unfiltered data, reset, metrics)
pub fn build_admin_app(state: AppState) -> Router {
    Router::new()
        .route("/", axum::routing::get(admin_root))
        .nest("/admin", admin_routes::routes(state))
        .layer(trace_layer())
}

async fn admin_root() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok", "api": "local_admin" }))
}

fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}

/// Credentialed CORS for an explicit origin list. Origins that are not valid
/// header values are skipped.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request())
            .allow_credentials(true),
    )
}
