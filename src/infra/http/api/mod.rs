pub mod error;
pub mod freshness;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post, put},
};

pub fn build_api_router(state: ApiState) -> Router {
    let catalog = Router::new()
        .route("/products", get(handlers::list_products))
        .route("/products/{slug}", get(handlers::get_product))
        .route("/blogs", get(handlers::list_blogs))
        .route("/blogs/{slug}", get(handlers::get_blog))
        .route("/categories", get(handlers::list_categories))
        .route("/categories/tree", get(handlers::category_tree))
        .route("/categories/{slug}", get(handlers::get_category))
        .route("/brands", get(handlers::list_brands))
        .route("/brands/{slug}", get(handlers::get_brand));

    let cart = Router::new()
        .route("/cart", get(handlers::get_cart))
        .route("/cart/items", post(handlers::add_cart_item))
        .route(
            "/cart/items/{product_id}",
            delete(handlers::remove_cart_item),
        )
        .layer(axum_middleware::map_response(freshness::no_store));

    let admin = Router::new()
        .route(
            "/products",
            get(handlers::admin_list_products).post(handlers::create_product),
        )
        .route(
            "/products/{id}",
            put(handlers::update_product).delete(handlers::delete_product),
        )
        .route(
            "/products/{id}/promotion",
            post(handlers::set_promotion).delete(handlers::clear_promotion),
        )
        .route(
            "/blogs",
            get(handlers::admin_list_blogs).post(handlers::create_blog),
        )
        .route(
            "/blogs/{id}",
            put(handlers::update_blog).delete(handlers::delete_blog),
        )
        .route("/categories", post(handlers::create_category))
        .route(
            "/categories/{id}",
            put(handlers::update_category).delete(handlers::delete_category),
        )
        .route("/brands", post(handlers::create_brand))
        .route(
            "/brands/{id}",
            put(handlers::update_brand).delete(handlers::delete_brand),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_auth,
        ))
        .layer(axum_middleware::map_response(freshness::no_store));

    let rate_state = state.clone();
    Router::new()
        .nest("/api/v1", catalog.merge(cart).nest("/admin", admin))
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            rate_state,
            middleware::api_rate_limit,
        ))
}
