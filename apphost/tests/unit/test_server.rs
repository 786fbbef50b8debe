//! Admin router tests

use std::sync::Arc;

use apphost::platform::Platform;
use apphost::server::serve::router;
use apphost::server::state::ServerState;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use crate::common::{harness, new_app, OWNER};

async fn get(platform: Arc<Platform>, uri: &str) -> (StatusCode, Value) {
    let response = router(Arc::new(ServerState::new(platform)))
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = harness().await;
    let platform = Arc::new(h.platform);

    let (status, body) = get(platform, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["running_apps"], 0);
    assert_eq!(body["proxy_in_sync"], true);
}

#[tokio::test]
async fn test_apps_endpoint_lists_every_owner() {
    let h = harness().await;
    h.platform.create_app(OWNER, new_app("blog")).await.unwrap();
    h.platform.create_app("user-2", new_app("shop")).await.unwrap();
    let platform = Arc::new(h.platform);

    let (status, body) = get(platform, "/apps").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);

    let hosts: Vec<_> = body["apps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|app| app["hostnames"][0].as_str().unwrap().to_string())
        .collect();
    assert!(hosts.contains(&"blog.apps.test".to_string()));
    assert!(hosts.contains(&"shop.apps.test".to_string()));
}

#[tokio::test]
async fn test_app_endpoint() {
    let h = harness().await;
    let app = h.platform.create_app(OWNER, new_app("blog")).await.unwrap();
    let platform = Arc::new(h.platform);

    let (status, body) = get(platform.clone(), &format!("/apps/{}", app.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "stopped");
    assert_eq!(body["process"], "stopped");
    assert_eq!(body["port"], app.port);

    let (status, body) = get(platform.clone(), &format!("/apps/{}/health", app.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], false);

    let (status, body) = get(platform, "/apps/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));
}
