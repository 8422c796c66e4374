mod support;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use bytes::Bytes;
use serde_json::json;

use storefront::cache::{CacheStore, StoreError};
use support::{AppOptions, admin, body_json, build_app_with, get, header};

/// Backend that refuses every operation.
struct UnreachableStore;

#[async_trait]
impl CacheStore for UnreachableStore {
    fn backend(&self) -> &'static str {
        "unreachable"
    }

    async fn get(&self, _key: &str) -> Result<Option<Bytes>, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn delete_by_prefix(&self, _prefix: &str) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn close(&self) {}
}

fn unreachable_options() -> AppOptions {
    AppOptions {
        store: Arc::new(UnreachableStore),
        ..AppOptions::default()
    }
}

#[tokio::test]
async fn reads_fall_through_to_origin_when_store_fails() {
    let app = build_app_with(unreachable_options()).await;

    for expected_calls in 1..=3 {
        let response = app.send(get("/api/v1/products?category=solar")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header(&response, "x-cache"), Some("MISS"));
        let body = body_json(response).await;
        assert_eq!(body["pagination"]["total"], 2);
        assert_eq!(app.products.list_calls(), expected_calls);
    }
}

#[tokio::test]
async fn writes_succeed_when_invalidation_cannot_reach_store() {
    let app = build_app_with(unreachable_options()).await;
    let panel = app.product_id("panel-400w").await;

    let response = app
        .send(admin(
            Method::POST,
            &format!("/api/v1/admin/products/{panel}/promotion"),
            Some(json!({ "label": "Clearance", "percent_off": 25 })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let detail = body_json(app.send(get("/api/v1/products/panel-400w")).await).await;
    assert_eq!(detail["data"]["promotion"]["label"], "Clearance");
}

#[tokio::test]
async fn health_probe_reports_unreachable_store() {
    let app = build_app_with(unreachable_options()).await;

    let response = app.send(get("/_health/cache")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "cache_unavailable");
}

#[tokio::test]
async fn health_probe_reports_memory_backend() {
    let app = support::build_app().await;

    let response = app.send(get("/_health/cache")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "cache-control"), Some("private, no-store"));
    let body = body_json(response).await;
    assert_eq!(body["data"]["backend"], "memory");
    assert_eq!(body["data"]["status"], "ok");
}
