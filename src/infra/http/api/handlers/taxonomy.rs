//! Category and brand handlers

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Response;

use crate::application::taxonomy::{detail_namespace, listing_namespace};
use crate::cache::Namespace;
use crate::domain::types::TaxonomyKind;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::freshness::public_json;
use crate::infra::http::api::models::{LocaleParams, TermListParams};
use crate::infra::http::api::state::ApiState;

pub async fn list_categories(
    state: State<ApiState>,
    headers: HeaderMap,
    params: Query<TermListParams>,
) -> Result<Response, ApiError> {
    list_terms(TaxonomyKind::Category, state, headers, params).await
}

pub async fn list_brands(
    state: State<ApiState>,
    headers: HeaderMap,
    params: Query<TermListParams>,
) -> Result<Response, ApiError> {
    list_terms(TaxonomyKind::Brand, state, headers, params).await
}

pub async fn get_category(
    state: State<ApiState>,
    headers: HeaderMap,
    slug: Path<String>,
    params: Query<LocaleParams>,
) -> Result<Response, ApiError> {
    get_term(TaxonomyKind::Category, state, headers, slug, params).await
}

pub async fn get_brand(
    state: State<ApiState>,
    headers: HeaderMap,
    slug: Path<String>,
    params: Query<LocaleParams>,
) -> Result<Response, ApiError> {
    get_term(TaxonomyKind::Brand, state, headers, slug, params).await
}

pub async fn category_tree(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<LocaleParams>,
) -> Result<Response, ApiError> {
    let locale = params.locale()?;
    let lookup = state.taxonomy.category_tree(&locale).await?;
    public_json(&headers, lookup, state.max_age(Namespace::CategoryTree))
}

async fn list_terms(
    kind: TaxonomyKind,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<TermListParams>,
) -> Result<Response, ApiError> {
    let query = params.into_query()?;
    let lookup = state.taxonomy.list_terms(kind, &query).await?;
    public_json(&headers, lookup, state.max_age(listing_namespace(kind)))
}

async fn get_term(
    kind: TaxonomyKind,
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Query(params): Query<LocaleParams>,
) -> Result<Response, ApiError> {
    let locale = params.locale()?;
    let lookup = state.taxonomy.get_term(kind, &slug, &locale).await?;
    public_json(&headers, lookup, state.max_age(detail_namespace(kind)))
}
