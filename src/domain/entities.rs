//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{FlagType, OperatorRole};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecord {
    pub id: Uuid,
    pub name: String,
    /// Opaque token SDK clients present; never changes after creation.
    pub access_key: String,
    pub owner_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
    #[serde(flatten)]
    pub application: ApplicationRecord,
    pub flag_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagRecord {
    pub id: Uuid,
    pub application_id: Uuid,
    pub key: String,
    pub display_name: String,
    pub description: Option<String>,
    pub enabled: bool,
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    pub value: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRecord {
    pub id: Uuid,
    pub application_id: Uuid,
    pub name: String,
    pub color: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A flag together with its resolved tags, as returned by the management API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagWithTags {
    #[serde(flatten)]
    pub flag: FlagRecord,
    pub tags: Vec<TagRecord>,
}

impl FlagWithTags {
    pub fn tag_ids(&self) -> Vec<Uuid> {
        self.tags.iter().map(|tag| tag.id).collect()
    }
}

/// Client-visible projection of an enabled flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributedFlag {
    pub key: String,
    pub enabled: bool,
    pub display_name: String,
    pub description: Option<String>,
    pub value: String,
    #[serde(rename = "type")]
    pub flag_type: FlagType,
}

impl From<&FlagRecord> for DistributedFlag {
    fn from(flag: &FlagRecord) -> Self {
        Self {
            key: flag.key.clone(),
            enabled: flag.enabled,
            display_name: flag.display_name.clone(),
            description: flag.description.clone(),
            value: flag.value.clone(),
            flag_type: flag.flag_type,
        }
    }
}

/// Every enabled flag of one application, keyed by its access key.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionSet {
    pub access_key: String,
    pub flags: Vec<DistributedFlag>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorRecord {
    pub id: Uuid,
    pub email: String,
    pub role: OperatorRole,
    pub token_prefix: String,
    pub hashed_secret: Vec<u8>,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
