//! Admin handlers.
//!
//! Listings use the admin cache scope and therefore always reach the origin.
//! Every write returns only after the services ran invalidation.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use uuid::Uuid;

use crate::application::blogs::BlogInput;
use crate::application::catalog::ProductInput;
use crate::application::taxonomy::TermInput;
use crate::application::views::ItemEnvelope;
use crate::cache::CacheScope;
use crate::domain::entities::{BlogRecord, ProductRecord, Promotion, TaxonomyRecord};
use crate::domain::types::TaxonomyKind;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::freshness::private_json;
use crate::infra::http::api::models::{BlogListParams, MutationAck, ProductListParams};
use crate::infra::http::api::state::ApiState;

fn product_ack(status: StatusCode, record: &ProductRecord) -> Response {
    let ack = MutationAck::new(record.id, &record.slug, record.updated_at);
    private_json(status, &ItemEnvelope::new(ack), None)
}

fn blog_ack(status: StatusCode, record: &BlogRecord) -> Response {
    let ack = MutationAck::new(record.id, &record.slug, record.updated_at);
    private_json(status, &ItemEnvelope::new(ack), None)
}

fn term_ack(status: StatusCode, record: &TaxonomyRecord) -> Response {
    let ack = MutationAck::new(record.id, &record.slug, record.updated_at);
    private_json(status, &ItemEnvelope::new(ack), None)
}

pub async fn admin_list_products(
    State(state): State<ApiState>,
    Query(params): Query<ProductListParams>,
) -> Result<Response, ApiError> {
    let query = params.into_query()?;
    let lookup = state
        .products
        .list_products(CacheScope::Admin, &query)
        .await?;
    Ok(private_json(StatusCode::OK, &lookup.value, Some(lookup.outcome)))
}

pub async fn admin_list_blogs(
    State(state): State<ApiState>,
    Query(params): Query<BlogListParams>,
) -> Result<Response, ApiError> {
    let query = params.into_query()?;
    let lookup = state.blogs.list_blogs(CacheScope::Admin, &query).await?;
    Ok(private_json(StatusCode::OK, &lookup.value, Some(lookup.outcome)))
}

pub async fn create_product(
    State(state): State<ApiState>,
    Json(payload): Json<ProductInput>,
) -> Result<Response, ApiError> {
    let record = state.products.create_product(payload).await?;
    Ok(product_ack(StatusCode::CREATED, &record))
}

pub async fn update_product(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProductInput>,
) -> Result<Response, ApiError> {
    let record = state.products.update_product(id, payload).await?;
    Ok(product_ack(StatusCode::OK, &record))
}

pub async fn delete_product(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let record = state.products.delete_product(id).await?;
    Ok(product_ack(StatusCode::OK, &record))
}

pub async fn set_promotion(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<Promotion>,
) -> Result<Response, ApiError> {
    let record = state.products.set_promotion(id, Some(payload)).await?;
    Ok(product_ack(StatusCode::OK, &record))
}

pub async fn clear_promotion(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let record = state.products.set_promotion(id, None).await?;
    Ok(product_ack(StatusCode::OK, &record))
}

pub async fn create_blog(
    State(state): State<ApiState>,
    Json(payload): Json<BlogInput>,
) -> Result<Response, ApiError> {
    let record = state.blogs.create_blog(payload).await?;
    Ok(blog_ack(StatusCode::CREATED, &record))
}

pub async fn update_blog(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BlogInput>,
) -> Result<Response, ApiError> {
    let record = state.blogs.update_blog(id, payload).await?;
    Ok(blog_ack(StatusCode::OK, &record))
}

pub async fn delete_blog(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let record = state.blogs.delete_blog(id).await?;
    Ok(blog_ack(StatusCode::OK, &record))
}

pub async fn create_category(
    state: State<ApiState>,
    payload: Json<TermInput>,
) -> Result<Response, ApiError> {
    create_term(TaxonomyKind::Category, state, payload).await
}

pub async fn update_category(
    state: State<ApiState>,
    id: Path<Uuid>,
    payload: Json<TermInput>,
) -> Result<Response, ApiError> {
    update_term(TaxonomyKind::Category, state, id, payload).await
}

pub async fn delete_category(
    state: State<ApiState>,
    id: Path<Uuid>,
) -> Result<Response, ApiError> {
    delete_term(TaxonomyKind::Category, state, id).await
}

pub async fn create_brand(
    state: State<ApiState>,
    payload: Json<TermInput>,
) -> Result<Response, ApiError> {
    create_term(TaxonomyKind::Brand, state, payload).await
}

pub async fn update_brand(
    state: State<ApiState>,
    id: Path<Uuid>,
    payload: Json<TermInput>,
) -> Result<Response, ApiError> {
    update_term(TaxonomyKind::Brand, state, id, payload).await
}

pub async fn delete_brand(state: State<ApiState>, id: Path<Uuid>) -> Result<Response, ApiError> {
    delete_term(TaxonomyKind::Brand, state, id).await
}

async fn create_term(
    kind: TaxonomyKind,
    State(state): State<ApiState>,
    Json(payload): Json<TermInput>,
) -> Result<Response, ApiError> {
    let record = state.taxonomy.create_term(kind, payload).await?;
    Ok(term_ack(StatusCode::CREATED, &record))
}

async fn update_term(
    kind: TaxonomyKind,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TermInput>,
) -> Result<Response, ApiError> {
    let record = state.taxonomy.update_term(kind, id, payload).await?;
    Ok(term_ack(StatusCode::OK, &record))
}

async fn delete_term(
    kind: TaxonomyKind,
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let record = state.taxonomy.delete_term(kind, id).await?;
    Ok(term_ack(StatusCode::OK, &record))
}
