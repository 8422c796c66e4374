mod support;

use std::time::Duration;

use axum::http::{Method, StatusCode};

use storefront::infra::http::RateLimits;
use support::{AppOptions, admin, body_json, build_app_with, get, get_with, header};

fn tight_limits() -> RateLimits {
    RateLimits {
        window: Duration::from_secs(60),
        auth: 1,
        catalog: 2,
        mutation: 1,
        cart: 1,
    }
}

#[tokio::test]
async fn catalog_reads_are_denied_once_the_window_is_spent() {
    let app = build_app_with(AppOptions {
        limits: tight_limits(),
        ..AppOptions::default()
    })
    .await;

    let first = app.send(get("/api/v1/products")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(header(&first, "x-ratelimit-remaining"), Some("1"));

    let second = app.send(get("/api/v1/blogs")).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(header(&second, "x-ratelimit-remaining"), Some("0"));

    let denied = app.send(get("/api/v1/categories")).await;
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = header(&denied, "retry-after")
        .expect("retry-after header")
        .parse()
        .expect("numeric retry-after");
    assert!((1..=60).contains(&retry_after));
    let body = body_json(denied).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "rate_limited");
    assert!(body["error"]["hint"].as_str().is_some());
}

#[tokio::test]
async fn budgets_are_tracked_per_client_and_route_class() {
    let app = build_app_with(AppOptions {
        limits: tight_limits(),
        ..AppOptions::default()
    })
    .await;
    let alice = [("x-forwarded-for", "198.51.100.1")];
    let bob = [("x-forwarded-for", "198.51.100.2")];

    for _ in 0..2 {
        let response = app.send(get_with("/api/v1/products", &alice)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let alice_denied = app.send(get_with("/api/v1/products", &alice)).await;
    assert_eq!(alice_denied.status(), StatusCode::TOO_MANY_REQUESTS);

    let bob_allowed = app.send(get_with("/api/v1/products", &bob)).await;
    assert_eq!(bob_allowed.status(), StatusCode::OK);

    let mutation = app
        .send(admin(
            Method::DELETE,
            "/api/v1/admin/products/00000000-0000-0000-0000-000000000000",
            None,
        ))
        .await;
    assert_ne!(mutation.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn health_probe_is_not_rate_limited() {
    let app = build_app_with(AppOptions {
        limits: tight_limits(),
        ..AppOptions::default()
    })
    .await;

    for _ in 0..5 {
        let response = app.send(get("/_health/cache")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
