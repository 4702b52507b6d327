// In-process HTTP helpers: routers are driven with `oneshot`, no sockets.
#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use dualgate::app::{build_admin_app, build_public_app};
use dualgate::config::AppConfig;
use dualgate::state::{AppState, Store, StoreOptions};

pub struct TestApp {
    pub router: Router,
}

impl TestApp {
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    pub async fn request(&self, req: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(req)
            .await
            .expect("Request failed")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.request(req).await
    }

    pub async fn delete(&self, uri: &str) -> Response<Body> {
        let req = Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.request(req).await
    }

    pub async fn post_json(&self, uri: &str, json: Value) -> Response<Body> {
        let body = serde_json::to_string(&json).unwrap();
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        self.request(req).await
    }

    pub async fn post_raw(&self, uri: &str, body: &'static str) -> Response<Body> {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        self.request(req).await
    }

    pub async fn json_body(response: Response<Body>) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

/// Both surfaces over one store in a temporary directory.
pub struct TestEnv {
    pub public: TestApp,
    pub admin: TestApp,
    pub state: AppState,
    pub config: AppConfig,
    pub dir: TempDir,
}

pub async fn setup() -> TestEnv {
    setup_with(AppConfig::default()).await
}

pub async fn setup_with(mut config: AppConfig) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    config.database_path = dir.path().join("test.db").display().to_string();
    config.admin_socket = dir.path().join("admin.sock").display().to_string();

    let store = Store::open(&config.database_path, StoreOptions::from(&config.store))
        .await
        .unwrap();
    let state = AppState::new(store, config.service_name.as_str());

    TestEnv {
        public: TestApp::new(build_public_app(state.clone(), &config)),
        admin: TestApp::new(build_admin_app(state.clone())),
        state,
        config,
        dir,
    }
}
