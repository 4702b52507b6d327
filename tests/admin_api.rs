mod helpers;

use axum::http::StatusCode;
use serde_json::json;

use helpers::{setup, TestApp};

#[tokio::test]
async fn test_admin_root() {
    let env = setup().await;

    let body = TestApp::json_body(env.admin.get("/").await).await;
    assert_eq!(body, json!({ "status": "ok", "api": "local_admin" }));
}

#[tokio::test]
async fn test_admin_sees_every_key() {
    let env = setup().await;

    let response = env
        .admin
        .post_json("/admin/data", json!({ "key": "_private_key", "value": "admin_secret" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = TestApp::json_body(response).await;
    assert_eq!(body["message"], "Admin set _private_key = admin_secret");

    env.public
        .post_json("/data", json!({ "key": "open", "value": "1" }))
        .await;

    let body = TestApp::json_body(env.admin.get("/admin/data/all").await).await;
    assert_eq!(
        body,
        json!({ "data": { "_private_key": "admin_secret", "open": "1" } })
    );
}

#[tokio::test]
async fn test_admin_rejects_empty_key() {
    let env = setup().await;

    let response = env
        .admin
        .post_json("/admin/data", json!({ "key": "", "value": "v" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_metrics_fields() {
    let env = setup().await;

    let response = env.admin.get("/admin/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = TestApp::json_body(response).await;

    assert_eq!(body["requests"], 0);
    assert!(body["last_access"].is_null());
    assert!(body["uptime_started_at"].is_string());
}

#[tokio::test]
async fn test_admin_read_counts_as_request() {
    let env = setup().await;

    env.admin.get("/admin/data/all").await;
    let body = TestApp::json_body(env.admin.get("/admin/metrics").await).await;

    assert_eq!(body["requests"], 1);
    assert!(body["last_access"].is_string());
}

#[tokio::test]
async fn test_reset_clears_data_and_keeps_uptime() {
    let env = setup().await;

    env.admin
        .post_json("/admin/data", json!({ "key": "a", "value": "1" }))
        .await;
    env.admin
        .post_json("/admin/data", json!({ "key": "_b", "value": "2" }))
        .await;
    let before = TestApp::json_body(env.admin.get("/admin/metrics").await).await;

    for _ in 0..2 {
        let response = env.admin.delete("/admin/data/reset").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = TestApp::json_body(response).await;
        assert_eq!(body["message"], "All data reset");

        let body = TestApp::json_body(env.admin.get("/admin/data/all").await).await;
        assert_eq!(body, json!({ "data": {} }));
    }

    let after = TestApp::json_body(env.admin.get("/admin/metrics").await).await;
    assert_eq!(after["uptime_started_at"], before["uptime_started_at"]);
}

#[tokio::test]
async fn test_status_composite() {
    let env = setup().await;

    env.admin
        .post_json("/admin/data", json!({ "key": "a", "value": "1" }))
        .await;
    env.admin
        .post_json("/admin/data", json!({ "key": "_b", "value": "2" }))
        .await;

    let response = env.admin.get("/admin/status").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = TestApp::json_body(response).await;

    assert_eq!(body["status"], "admin_healthy");
    assert_eq!(body["data_items"], 2);
    assert_eq!(body["metrics"]["requests"], 0);
}

#[tokio::test]
async fn test_single_record_lookup() {
    let env = setup().await;

    env.admin
        .post_json("/admin/data", json!({ "key": "_cfg", "value": "on" }))
        .await;

    let response = env.admin.get("/admin/record/_cfg").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = TestApp::json_body(response).await;
    assert_eq!(body["key"], "_cfg");
    assert_eq!(body["value"], "on");
    assert!(body["created_at"].is_string());
    assert!(body["updated_at"].is_string());

    let response = env.admin.get("/admin/record/missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_record_lookup_for_route_like_keys() {
    let env = setup().await;

    for key in ["all", "reset"] {
        env.admin
            .post_json("/admin/data", json!({ "key": key, "value": "x" }))
            .await;

        let response = env.admin.get(&format!("/admin/record/{key}")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = TestApp::json_body(response).await;
        assert_eq!(body["key"], key);
    }
}

#[tokio::test]
async fn test_admin_malformed_body_gets_detail() {
    let env = setup().await;

    let response = env.admin.post_raw("/admin/data", "{\"key\": ").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = TestApp::json_body(response).await;
    assert!(body["detail"].is_string());
    assert_eq!(env.state.store.count().await.unwrap(), 0);
}
