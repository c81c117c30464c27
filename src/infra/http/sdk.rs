//! Public flag distribution endpoint consumed by client SDKs.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};

use crate::cache::{CacheError, DistributionCache};

use super::api::error::{ApiError, codes};
use super::rate_limit::{RateDecision, RateLimiter};

const SOURCE: &str = "infra::http::sdk";
const NO_STORE: &str = "no-cache, no-store";

#[derive(Clone)]
pub struct SdkState {
    pub cache: Arc<DistributionCache>,
    pub rate_limiter: Arc<RateLimiter>,
}

pub fn build_sdk_router(state: SdkState) -> Router {
    Router::new()
        .route("/sdk/{access_key}/flags", get(distribution_flags))
        .with_state(state)
}

async fn distribution_flags(
    State(state): State<SdkState>,
    Path(access_key): Path<String>,
) -> Response {
    let remaining = match state.rate_limiter.check(&access_key) {
        RateDecision::Allowed { remaining } => remaining,
        RateDecision::Limited { retry_after_secs } => {
            return no_store(ApiError::rate_limited(SOURCE, retry_after_secs));
        }
    };

    let mut response = match state.cache.get(&access_key).await {
        Ok(entry) => (
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            entry.body.clone(),
        )
            .into_response(),
        Err(CacheError::UnknownAccessKey(_)) => {
            ApiError::not_found("application not found or invalid access key")
                .with_source(SOURCE)
                .into_response()
        }
        Err(CacheError::Repo(err)) => ApiError::from(err).with_source(SOURCE).into_response(),
        Err(err @ CacheError::Encode(_)) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Failed to encode flags",
            Some(err.to_string()),
        )
        .with_source(SOURCE)
        .into_response(),
    };

    state.rate_limiter.annotate(&mut response, remaining);
    no_store(response)
}

fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    response
}
