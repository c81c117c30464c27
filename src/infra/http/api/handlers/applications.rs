//! Application handlers

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::operators::Principal;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extract::{ApiJson, ApiPath};
use crate::infra::http::api::models::ApplicationCreateRequest;
use crate::infra::http::api::state::ApiState;

pub async fn create_application(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    ApiJson(payload): ApiJson<ApplicationCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let application = state
        .applications
        .create(&principal, payload.into())
        .await?;

    Ok((StatusCode::CREATED, Json(application)))
}

pub async fn list_applications(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let applications = state.applications.list(&principal).await?;
    Ok(Json(applications))
}

pub async fn get_application(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let application = state.applications.get(&principal, id).await?;
    Ok(Json(application))
}

pub async fn delete_application(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state.applications.delete(&principal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
