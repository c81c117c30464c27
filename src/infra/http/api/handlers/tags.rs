//! Tags handlers

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::operators::Principal;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extract::{ApiJson, ApiPath};
use crate::infra::http::api::models::{TagCreateRequest, TagUpdateRequest};
use crate::infra::http::api::state::ApiState;

pub async fn list_tags(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    ApiPath(application_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let tags = state.tags.list(&principal, application_id).await?;
    Ok(Json(tags))
}

pub async fn create_tag(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    ApiPath(application_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<TagCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tag = state
        .tags
        .create(&principal, application_id, payload.into())
        .await?;

    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn update_tag(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    ApiPath((application_id, tag_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(payload): ApiJson<TagUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tag = state
        .tags
        .update(&principal, application_id, tag_id, payload.into())
        .await?;

    Ok(Json(tag))
}

pub async fn delete_tag(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    ApiPath((application_id, tag_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .tags
        .delete(&principal, application_id, tag_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
