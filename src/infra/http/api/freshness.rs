//! Response headers for cached reads: `Cache-Control`, weak `ETag`,
//! conditional `304` and the `x-cache` outcome.

use std::time::Duration;

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::application::error::AppError;
use crate::cache::{CacheOutcome, Lookup};

use super::error::ApiError;

pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
pub const NO_STORE: &str = "private, no-store";

/// Serializes a public cached read with freshness headers.
pub fn public_json<T: Serialize>(
    request_headers: &HeaderMap,
    lookup: Lookup<T>,
    max_age: Duration,
) -> Result<Response, ApiError> {
    let body = serde_json::to_vec(&lookup.value)
        .map_err(|err| ApiError::from(AppError::unexpected(err.to_string())))?;
    let etag = weak_etag(&body);
    let cache_control = format!("public, max-age={}", max_age.as_secs());

    let status = if if_none_match(request_headers, &etag) {
        StatusCode::NOT_MODIFIED
    } else {
        StatusCode::OK
    };
    let mut response = if status == StatusCode::NOT_MODIFIED {
        status.into_response()
    } else {
        let mut response = Response::new(Body::from(body));
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&cache_control) {
        headers.insert(CACHE_CONTROL, value);
    }
    headers.insert(X_CACHE, outcome_header(lookup.outcome));
    Ok(response)
}

/// Serializes a per-session or admin response that shared caches must not keep.
pub fn private_json<T: Serialize>(
    status: StatusCode,
    value: &T,
    outcome: Option<CacheOutcome>,
) -> Response {
    let mut response = (status, axum::Json(value)).into_response();
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    if let Some(outcome) = outcome {
        response
            .headers_mut()
            .insert(X_CACHE, outcome_header(outcome));
    }
    response
}

/// Layer for routers whose every response is private.
pub async fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    response
}

pub fn weak_etag(body: &[u8]) -> String {
    format!("W/\"{}\"", hex::encode(Sha256::digest(body)))
}

fn outcome_header(outcome: CacheOutcome) -> HeaderValue {
    HeaderValue::from_static(outcome.as_str())
}

/// Weak comparison: `W/` prefixes are ignored on both sides.
fn if_none_match(headers: &HeaderMap, etag: &str) -> bool {
    let ours = opaque_tag(etag);
    headers
        .get_all(IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .any(|candidate| candidate == "*" || opaque_tag(candidate) == ours)
}

fn opaque_tag(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(outcome: CacheOutcome) -> Lookup<serde_json::Value> {
        Lookup {
            value: serde_json::json!({ "success": true, "items": [] }),
            outcome,
        }
    }

    #[test]
    fn public_response_has_freshness_headers() {
        let response = public_json(
            &HeaderMap::new(),
            lookup(CacheOutcome::Miss),
            Duration::from_secs(60),
        )
        .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CACHE_CONTROL).and_then(|v| v.to_str().ok()),
            Some("public, max-age=60")
        );
        assert_eq!(
            response.headers().get(X_CACHE).and_then(|v| v.to_str().ok()),
            Some("MISS")
        );
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .expect("etag");
        assert!(etag.starts_with("W/\""));
    }

    #[test]
    fn matching_if_none_match_yields_not_modified() {
        let body = serde_json::to_vec(&lookup(CacheOutcome::Hit).value).expect("body");
        let etag = weak_etag(&body);
        let mut headers = HeaderMap::new();
        headers.insert(
            IF_NONE_MATCH,
            HeaderValue::from_str(&format!("\"other\", {}", opaque_tag(&etag))).expect("header"),
        );

        let response = public_json(&headers, lookup(CacheOutcome::Hit), Duration::ZERO)
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(
            response.headers().get(CACHE_CONTROL).and_then(|v| v.to_str().ok()),
            Some("public, max-age=0")
        );
    }

    #[test]
    fn private_response_is_not_storable() {
        let response = private_json(StatusCode::CREATED, &serde_json::json!({}), None);
        assert_eq!(
            response.headers().get(CACHE_CONTROL).and_then(|v| v.to_str().ok()),
            Some(NO_STORE)
        );
        assert!(response.headers().get(X_CACHE).is_none());
    }
}
