pub mod api;
mod middleware;
pub mod rate_limit;
mod sdk;

pub use api::{ApiState, build_api_router as build_api_v1_router};
pub use rate_limit::RateLimiter;
pub use sdk::{SdkState, build_sdk_router};

use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;
use crate::infra::db::PostgresRepositories;

use self::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub db: Arc<PostgresRepositories>,
}

#[derive(Clone)]
pub struct RouterState {
    pub http: HttpState,
    pub sdk: SdkState,
    pub api: ApiState,
}

impl FromRef<RouterState> for HttpState {
    fn from_ref(state: &RouterState) -> Self {
        state.http.clone()
    }
}

/// Assemble every surface of the service behind the shared logging layers.
pub fn build_router(state: RouterState) -> Router {
    let sdk = build_sdk_router(state.sdk.clone());

    Router::new()
        .route("/health", get(health))
        .merge(build_api_v1_router(state.api.clone()))
        .with_state(state)
        .merge(sdk)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn health(State(state): State<HttpState>) -> Response {
    db_health_response(state.db.health_check().await)
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
