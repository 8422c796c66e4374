use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;

use crate::cache::{CacheScope, Namespace};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::freshness::public_json;
use crate::infra::http::api::models::{BlogListParams, LocaleParams};
use crate::infra::http::api::state::ApiState;

pub async fn list_blogs(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<BlogListParams>,
) -> Result<Response, ApiError> {
    let query = params.into_query()?;
    let lookup = state.blogs.list_blogs(CacheScope::Public, &query).await?;
    public_json(&headers, lookup, state.max_age(Namespace::Blogs))
}

pub async fn get_blog(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Query(params): Query<LocaleParams>,
) -> Result<Response, ApiError> {
    let locale = params.locale()?;
    let lookup = state
        .blogs
        .get_blog(CacheScope::Public, &slug, &locale)
        .await?;
    public_json(&headers, lookup, state.max_age(Namespace::Blog))
}
