use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::application::admin::applications::CreateApplicationCommand;
use crate::application::admin::bulk_tags::{BulkTagAction, BulkTagCommand};
use crate::application::admin::flags::{CreateFlagCommand, UpdateFlagCommand};
use crate::application::admin::tags::{CreateTagCommand, UpdateTagCommand};
use crate::domain::types::FlagType;

/// Distinguish an absent field from an explicit `null`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct ApplicationCreateRequest {
    pub name: String,
}

impl From<ApplicationCreateRequest> for CreateApplicationCommand {
    fn from(request: ApplicationCreateRequest) -> Self {
        Self { name: request.name }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagCreateRequest {
    pub key: String,
    pub display_name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(rename = "type")]
    pub flag_type: Option<FlagType>,
    pub value: String,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
}

impl From<FlagCreateRequest> for CreateFlagCommand {
    fn from(request: FlagCreateRequest) -> Self {
        Self {
            key: request.key,
            display_name: request.display_name,
            description: request.description,
            enabled: request.enabled,
            flag_type: request.flag_type,
            value: request.value,
            tag_ids: request.tag_ids,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagUpdateRequest {
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub enabled: Option<bool>,
    #[serde(rename = "type")]
    pub flag_type: Option<FlagType>,
    pub value: Option<String>,
    pub tag_ids: Option<Vec<Uuid>>,
}

impl From<FlagUpdateRequest> for UpdateFlagCommand {
    fn from(request: FlagUpdateRequest) -> Self {
        Self {
            display_name: request.display_name,
            description: request.description,
            enabled: request.enabled,
            flag_type: request.flag_type,
            value: request.value,
            tag_ids: request.tag_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagTagsRequest {
    pub tag_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTagRequest {
    pub flag_ids: Vec<Uuid>,
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    pub action: BulkTagAction,
}

impl From<BulkTagRequest> for BulkTagCommand {
    fn from(request: BulkTagRequest) -> Self {
        Self {
            flag_ids: request.flag_ids,
            tag_ids: request.tag_ids,
            action: request.action,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TagCreateRequest {
    pub name: String,
    pub color: Option<String>,
}

impl From<TagCreateRequest> for CreateTagCommand {
    fn from(request: TagCreateRequest) -> Self {
        Self {
            name: request.name,
            color: request.color,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TagUpdateRequest {
    pub name: Option<String>,
    pub color: Option<String>,
}

impl From<TagUpdateRequest> for UpdateTagCommand {
    fn from(request: TagUpdateRequest) -> Self {
        Self {
            name: request.name,
            color: request.color,
        }
    }
}
