use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderName, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::infra::http::rate_limit::{RateDecision, RouteClass};

use super::error::ApiError;
use super::state::ApiState;

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
const ANONYMOUS_CLIENT: &str = "anonymous";

pub async fn admin_auth(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        warn!(
            target = "storefront::api::auth",
            "admin request rejected: no admin token configured"
        );
        return ApiError::forbidden(
            "Admin API disabled",
            Some("Configure `admin.token` to enable admin routes".to_string()),
        )
        .into_response();
    };

    let presented = extract_token(request.headers().get(axum::http::header::AUTHORIZATION));
    match presented {
        Some(token) if bool::from(token.as_bytes().ct_eq(expected.as_bytes())) => {
            next.run(request).await
        }
        _ => ApiError::unauthorized().into_response(),
    }
}

pub async fn api_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let class = RouteClass::classify(request.method(), request.uri().path());
    let client = client_key(&request);

    match state.rate_guard.allow(&client, class) {
        RateDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
            response
        }
        RateDecision::Denied { retry_after_secs } => ApiError::rate_limited(retry_after_secs),
    }
}

/// First `x-forwarded-for` hop, else the peer address, else a shared anonymous bucket.
pub(crate) fn client_key(request: &Request<Body>) -> String {
    request
        .headers()
        .get(X_FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string())
}

fn extract_token(header: Option<&HeaderValue>) -> Option<&str> {
    let raw = header?.to_str().ok()?;
    raw.strip_prefix("Bearer ").map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(headers: &[(&str, &str)]) -> Request<Body> {
        let mut builder = Request::builder().uri("/api/v1/products");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::empty()).expect("request")
    }

    #[test]
    fn client_key_prefers_first_forwarded_hop() {
        let request = request(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1")]);
        assert_eq!(client_key(&request), "203.0.113.7");
    }

    #[test]
    fn client_key_falls_back_to_peer_then_anonymous() {
        let mut with_peer = request(&[]);
        with_peer
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(client_key(&with_peer), "192.0.2.1");
        assert_eq!(client_key(&request(&[])), ANONYMOUS_CLIENT);
    }

    #[test]
    fn bearer_token_is_extracted() {
        let value = HeaderValue::from_static("Bearer s3cret");
        assert_eq!(extract_token(Some(&value)), Some("s3cret"));
        let basic = HeaderValue::from_static("Basic abc");
        assert_eq!(extract_token(Some(&basic)), None);
    }
}
