//! Session cart handlers

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use uuid::Uuid;

use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::freshness::private_json;
use crate::infra::http::api::models::{CartItemRequest, LocaleParams};
use crate::infra::http::api::state::ApiState;

const SESSION_HEADER: &str = "x-session-id";

fn session_id(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ApiError::bad_request(
                "Cart session required",
                Some(format!("Send the `{SESSION_HEADER}` header")),
            )
        })
}

pub async fn get_cart(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<LocaleParams>,
) -> Result<Response, ApiError> {
    let session = session_id(&headers)?;
    let locale = params.locale()?;
    let lookup = state.cart.get_cart(session, &locale).await?;
    Ok(private_json(StatusCode::OK, &lookup.value, Some(lookup.outcome)))
}

/// Adds a line and answers with the refreshed cart.
pub async fn add_cart_item(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Query(params): Query<LocaleParams>,
    Json(payload): Json<CartItemRequest>,
) -> Result<Response, ApiError> {
    let session = session_id(&headers)?;
    let locale = params.locale()?;
    state
        .cart
        .add_item(session, payload.product_id, payload.quantity)
        .await?;
    let lookup = state.cart.get_cart(session, &locale).await?;
    Ok(private_json(StatusCode::OK, &lookup.value, Some(lookup.outcome)))
}

pub async fn remove_cart_item(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(product_id): Path<Uuid>,
    Query(params): Query<LocaleParams>,
) -> Result<Response, ApiError> {
    let session = session_id(&headers)?;
    let locale = params.locale()?;
    state.cart.remove_item(session, product_id).await?;
    let lookup = state.cart.get_cart(session, &locale).await?;
    Ok(private_json(StatusCode::OK, &lookup.value, Some(lookup.outcome)))
}
