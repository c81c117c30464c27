pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

#[cfg(test)]
mod tests;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch, post, put},
};

/// Routes under `/api/v1`, authenticated and rate limited per operator.
pub fn build_api_router<S>(state: ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let auth_state = state.clone();
    let rate_state = state.clone();

    Router::new()
        .route(
            "/api/v1/applications",
            get(handlers::list_applications).post(handlers::create_application),
        )
        .route(
            "/api/v1/applications/{id}",
            get(handlers::get_application).delete(handlers::delete_application),
        )
        .route(
            "/api/v1/applications/{id}/flags",
            get(handlers::list_flags).post(handlers::create_flag),
        )
        .route(
            "/api/v1/applications/{id}/flags/bulk-tags",
            post(handlers::bulk_tag_flags),
        )
        .route(
            "/api/v1/applications/{id}/flags/{flag_id}",
            patch(handlers::update_flag).delete(handlers::delete_flag),
        )
        .route(
            "/api/v1/applications/{id}/flags/{flag_id}/tags",
            put(handlers::assign_flag_tags),
        )
        .route(
            "/api/v1/applications/{id}/tags",
            get(handlers::list_tags).post(handlers::create_tag),
        )
        .route(
            "/api/v1/applications/{id}/tags/{tag_id}",
            patch(handlers::update_tag).delete(handlers::delete_tag),
        )
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            rate_state,
            middleware::api_rate_limit,
        ))
        .layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::api_auth,
        ))
}
