use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::warn;

use crate::application::operators::{AuthError, Principal};
use crate::infra::http::rate_limit::RateDecision;

use super::error::ApiError;
use super::state::ApiState;

pub async fn api_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers()) else {
        return ApiError::unauthorized("operator token required").into_response();
    };

    let principal = match state.operators.authenticate(&token).await {
        Ok(principal) => principal,
        Err(AuthError::Missing) => {
            return ApiError::unauthorized("operator token required").into_response();
        }
        Err(AuthError::Invalid) => {
            return ApiError::unauthorized("invalid operator token").into_response();
        }
        Err(AuthError::Revoked) => return ApiError::revoked().into_response(),
        Err(AuthError::Repo(err)) => {
            return ApiError::from(err)
                .with_source("infra::http::api::auth")
                .into_response();
        }
    };

    request.extensions_mut().insert(principal.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(principal);
    response
}

pub async fn api_rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(principal) = request.extensions().get::<Principal>() else {
        warn!(
            target: "flagcast::api",
            "missing principal in rate limit middleware"
        );
        return ApiError::unauthorized("operator token required").into_response();
    };

    let key = principal.operator_id.to_string();
    match state.rate_limiter.check(&key) {
        RateDecision::Limited { retry_after_secs } => {
            ApiError::rate_limited("infra::http::api::rate_limit", retry_after_secs)
        }
        RateDecision::Allowed { remaining } => {
            let mut response = next.run(request).await;
            state.rate_limiter.annotate(&mut response, remaining);
            response
        }
    }
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    bearer
        .or_else(|| {
            headers
                .get("x-api-key")
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|token| !token.is_empty())
        })
        .map(str::to_string)
}
