//! Flag handlers, including tag assignment and bulk tagging

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::operators::Principal;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::extract::{ApiJson, ApiPath};
use crate::infra::http::api::models::{
    BulkTagRequest, FlagCreateRequest, FlagTagsRequest, FlagUpdateRequest,
};
use crate::infra::http::api::state::ApiState;

pub async fn list_flags(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    ApiPath(application_id): ApiPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let flags = state.flags.list(&principal, application_id).await?;
    Ok(Json(flags))
}

pub async fn create_flag(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    ApiPath(application_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<FlagCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flag = state
        .flags
        .create(&principal, application_id, payload.into())
        .await?;

    Ok((StatusCode::CREATED, Json(flag)))
}

pub async fn update_flag(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    ApiPath((application_id, flag_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(payload): ApiJson<FlagUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flag = state
        .flags
        .update(&principal, application_id, flag_id, payload.into())
        .await?;

    Ok(Json(flag))
}

pub async fn delete_flag(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    ApiPath((application_id, flag_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .flags
        .delete(&principal, application_id, flag_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_flag_tags(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    ApiPath((application_id, flag_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(payload): ApiJson<FlagTagsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let flag = state
        .flags
        .assign_tags(&principal, application_id, flag_id, payload.tag_ids)
        .await?;

    Ok(Json(flag))
}

pub async fn bulk_tag_flags(
    State(state): State<ApiState>,
    Extension(principal): Extension<Principal>,
    ApiPath(application_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<BulkTagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .bulk_tags
        .apply(&principal, application_id, payload.into())
        .await?;

    Ok(Json(outcome))
}
