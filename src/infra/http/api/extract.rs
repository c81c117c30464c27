//! Extractors whose rejections use the API error envelope.

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Path};

use super::error::ApiError;

#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);
