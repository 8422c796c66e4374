use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::views::ItemEnvelope;
use crate::infra::http::api::error::{ApiError, codes};
use crate::infra::http::api::freshness::private_json;
use crate::infra::http::api::state::ApiState;

#[derive(Debug, Serialize)]
struct CacheHealth {
    backend: &'static str,
    status: &'static str,
}

pub async fn cache_health(State(state): State<ApiState>) -> Response {
    let backend = state.cache.store.backend();
    match state.cache.store.ping().await {
        Ok(()) => private_json(
            StatusCode::OK,
            &ItemEnvelope::new(CacheHealth {
                backend,
                status: "ok",
            }),
            None,
        ),
        Err(err) => {
            let mut response = ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::CACHE_UNAVAILABLE,
                "Cache store unreachable",
                Some(format!("backend `{backend}` did not answer the ping")),
            )
            .into_response();
            ErrorReport::from_error(
                "infra::http::cache_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
