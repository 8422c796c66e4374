mod support;

use axum::http::{Method, StatusCode};
use serde_json::json;

use storefront::domain::types::TaxonomyKind;
use support::{admin, body_json, build_app, get, header};

#[tokio::test]
async fn product_update_commits_and_purges_when_blog_lookup_fails() {
    let app = build_app().await;
    let product_uri = "/api/v1/products/panel-400w";
    let blog_uri = "/api/v1/blogs/choosing-panels";

    let cached = body_json(app.send(get(product_uri)).await).await;
    assert_eq!(cached["data"]["price_cents"], 19999);
    assert_eq!(
        header(&app.send(get(product_uri)).await, "x-cache"),
        Some("HIT")
    );
    app.send(get(blog_uri)).await;
    assert_eq!(header(&app.send(get(blog_uri)).await, "x-cache"), Some("HIT"));

    let panel = app.product_id("panel-400w").await;
    let solar = app.term_id(TaxonomyKind::Category, "solar").await;
    app.blogs.fail_reference_lookups(true);
    let updated = app
        .send(admin(
            Method::PUT,
            &format!("/api/v1/admin/products/{panel}"),
            Some(json!({
                "slug": "panel-400w",
                "name": { "en": "Panel 400W" },
                "price_cents": 25000,
                "currency": "USD",
                "category_id": solar,
                "status": "published",
            })),
        ))
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    app.blogs.fail_reference_lookups(false);

    let refreshed = app.send(get(product_uri)).await;
    assert_eq!(header(&refreshed, "x-cache"), Some("MISS"));
    let refreshed = body_json(refreshed).await;
    assert_eq!(refreshed["data"]["price_cents"], 25000);

    let blog = app.send(get(blog_uri)).await;
    assert_eq!(header(&blog, "x-cache"), Some("MISS"));
    let blog = body_json(blog).await;
    let prices: Vec<u64> = blog["data"]["products"]
        .as_array()
        .expect("products array")
        .iter()
        .filter_map(|product| product["effective_price_cents"].as_u64())
        .collect();
    assert!(prices.contains(&25000));
}

#[tokio::test]
async fn promotion_commits_and_purges_blog_listings_when_blog_lookup_fails() {
    let app = build_app().await;
    let listing = "/api/v1/blogs";

    app.send(get(listing)).await;
    assert_eq!(header(&app.send(get(listing)).await, "x-cache"), Some("HIT"));

    let panel = app.product_id("panel-200w").await;
    app.blogs.fail_reference_lookups(true);
    let promoted = app
        .send(admin(
            Method::POST,
            &format!("/api/v1/admin/products/{panel}/promotion"),
            Some(json!({ "label": "Spring", "percent_off": 10 })),
        ))
        .await;
    assert_eq!(promoted.status(), StatusCode::OK);
    app.blogs.fail_reference_lookups(false);

    assert_eq!(header(&app.send(get(listing)).await, "x-cache"), Some("MISS"));
    let product = body_json(app.send(get("/api/v1/products/panel-200w")).await).await;
    assert_eq!(product["data"]["promotion"]["label"], "Spring");
}

#[tokio::test]
async fn blog_delete_commits_and_purges_products_when_product_lookup_fails() {
    let app = build_app().await;
    let product_uri = "/api/v1/products/panel-200w";

    let before = body_json(app.send(get(product_uri)).await).await;
    assert_eq!(before["data"]["related_blogs"][0]["slug"], "choosing-panels");
    assert_eq!(
        header(&app.send(get(product_uri)).await, "x-cache"),
        Some("HIT")
    );

    let blog = app.blog_id("choosing-panels").await;
    app.products.fail_batch_lookups(true);
    let deleted = app
        .send(admin(
            Method::DELETE,
            &format!("/api/v1/admin/blogs/{blog}"),
            None,
        ))
        .await;
    assert_eq!(deleted.status(), StatusCode::OK);
    app.products.fail_batch_lookups(false);

    let after = app.send(get(product_uri)).await;
    assert_eq!(header(&after, "x-cache"), Some("MISS"));
    let after = body_json(after).await;
    assert_eq!(
        after["data"]["related_blogs"]
            .as_array()
            .expect("related blogs array")
            .len(),
        0
    );
}
