//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{
    ApplicationRecord, ApplicationSummary, DistributionSet, FlagRecord, OperatorRecord, TagRecord,
};
use crate::domain::types::{FlagType, OperatorRole};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateApplicationParams {
    pub name: String,
    pub access_key: String,
    pub owner_id: Uuid,
}

#[async_trait]
pub trait ApplicationsRepo: Send + Sync {
    async fn find_application(&self, id: Uuid) -> Result<Option<ApplicationRecord>, RepoError>;

    async fn list_owned_applications(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<ApplicationSummary>, RepoError>;
}

#[async_trait]
pub trait ApplicationsWriteRepo: Send + Sync {
    async fn create_application(
        &self,
        params: CreateApplicationParams,
    ) -> Result<ApplicationRecord, RepoError>;

    /// Remove the application with every flag, tag and association it owns.
    ///
    /// Implementations must make the whole cascade visible at once.
    async fn delete_application(&self, id: Uuid) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateFlagParams {
    pub application_id: Uuid,
    pub key: String,
    pub display_name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub flag_type: FlagType,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct UpdateFlagParams {
    pub id: Uuid,
    pub display_name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub flag_type: FlagType,
    pub value: String,
}

#[async_trait]
pub trait FlagsRepo: Send + Sync {
    async fn find_flag(&self, id: Uuid) -> Result<Option<FlagRecord>, RepoError>;

    async fn find_flag_by_key(
        &self,
        application_id: Uuid,
        key: &str,
    ) -> Result<Option<FlagRecord>, RepoError>;

    /// Flags of the application ordered by creation time.
    async fn list_flags(&self, application_id: Uuid) -> Result<Vec<FlagRecord>, RepoError>;

    /// The subset of `ids` that belongs to the application, in creation order.
    async fn find_flags_in_application(
        &self,
        application_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<FlagRecord>, RepoError>;
}

#[async_trait]
pub trait FlagsWriteRepo: Send + Sync {
    /// Insert the flag and attach `tag_ids` in one unit.
    async fn create_flag(
        &self,
        params: CreateFlagParams,
        tag_ids: &[Uuid],
    ) -> Result<FlagRecord, RepoError>;

    /// Update the flag; when `tag_ids` is present the tag set is replaced in the same unit.
    async fn update_flag(
        &self,
        params: UpdateFlagParams,
        tag_ids: Option<&[Uuid]>,
    ) -> Result<FlagRecord, RepoError>;

    async fn delete_flag(&self, id: Uuid) -> Result<(), RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateTagParams {
    pub application_id: Uuid,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone)]
pub struct UpdateTagParams {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

#[async_trait]
pub trait TagsRepo: Send + Sync {
    async fn find_tag(&self, id: Uuid) -> Result<Option<TagRecord>, RepoError>;

    async fn find_tag_by_name(
        &self,
        application_id: Uuid,
        name: &str,
    ) -> Result<Option<TagRecord>, RepoError>;

    /// Tags of the application ordered by name.
    async fn list_tags(&self, application_id: Uuid) -> Result<Vec<TagRecord>, RepoError>;

    /// The subset of `ids` that names tags of the application.
    async fn find_tags_in_application(
        &self,
        application_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<TagRecord>, RepoError>;

    /// Tags attached to each of the given flags as `(flag_id, tag)` pairs.
    async fn list_tags_for_flags(
        &self,
        flag_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, TagRecord)>, RepoError>;
}

#[async_trait]
pub trait TagsWriteRepo: Send + Sync {
    async fn create_tag(&self, params: CreateTagParams) -> Result<TagRecord, RepoError>;

    async fn update_tag(&self, params: UpdateTagParams) -> Result<TagRecord, RepoError>;

    /// Delete the tag and strip it from every flag in one unit.
    async fn delete_tag(&self, id: Uuid) -> Result<(), RepoError>;
}

/// Association writes used by tag assignment and the bulk tag engine.
#[async_trait]
pub trait FlagTagsWriteRepo: Send + Sync {
    /// Make the flag's tag set exactly `tag_ids`.
    async fn replace_flag_tags(&self, flag_id: Uuid, tag_ids: &[Uuid]) -> Result<(), RepoError>;

    /// Attach `tag_ids`; already-present associations are left untouched.
    async fn add_flag_tags(&self, flag_id: Uuid, tag_ids: &[Uuid]) -> Result<(), RepoError>;

    async fn remove_flag_tags(&self, flag_id: Uuid, tag_ids: &[Uuid]) -> Result<(), RepoError>;
}

/// Read model feeding the distribution cache.
#[async_trait]
pub trait DistributionRepo: Send + Sync {
    /// Enabled flags of the application owning `access_key`, or `None` when no
    /// application uses that key.
    async fn load_distribution(
        &self,
        access_key: &str,
    ) -> Result<Option<DistributionSet>, RepoError>;

    /// Enabled flags of every application; applications without enabled flags
    /// are included with an empty list.
    async fn load_all_distributions(&self) -> Result<Vec<DistributionSet>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct UpsertOperatorParams {
    pub email: String,
    pub role: OperatorRole,
    pub token_prefix: String,
    pub hashed_secret: Vec<u8>,
}

#[async_trait]
pub trait OperatorsRepo: Send + Sync {
    async fn find_by_token_prefix(&self, prefix: &str)
    -> Result<Option<OperatorRecord>, RepoError>;

    /// Create the operator, or replace role and credentials when the email exists.
    async fn upsert_operator(
        &self,
        params: UpsertOperatorParams,
    ) -> Result<OperatorRecord, RepoError>;

    async fn revoke_operator(&self, email: &str, at: OffsetDateTime) -> Result<(), RepoError>;
}
