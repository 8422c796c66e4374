//! Product handlers

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;

use crate::cache::{CacheScope, Namespace};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::freshness::public_json;
use crate::infra::http::api::models::{LocaleParams, ProductListParams};
use crate::infra::http::api::state::ApiState;

pub async fn list_products(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<ProductListParams>,
) -> Result<Response, ApiError> {
    let query = params.into_query()?;
    let lookup = state
        .products
        .list_products(CacheScope::Public, &query)
        .await?;
    public_json(&headers, lookup, state.max_age(Namespace::Products))
}

pub async fn get_product(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Query(params): Query<LocaleParams>,
) -> Result<Response, ApiError> {
    let locale = params.locale()?;
    let lookup = state
        .products
        .get_product(CacheScope::Public, &slug, &locale)
        .await?;
    public_json(&headers, lookup, state.max_age(Namespace::Product))
}
