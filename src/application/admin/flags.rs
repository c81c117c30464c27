use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::application::admin::access::{readable_application, writable_application};
use crate::application::admin::error::{AdminError, optional_trimmed, require_trimmed};
use crate::application::operators::Principal;
use crate::application::repos::{
    ApplicationsRepo, CreateFlagParams, FlagTagsWriteRepo, FlagsRepo, FlagsWriteRepo, RepoError,
    TagsRepo, UpdateFlagParams,
};
use crate::cache::DistributionCache;
use crate::domain::entities::{ApplicationRecord, FlagRecord, FlagWithTags, TagRecord};
use crate::domain::flags::validate_flag_value;
use crate::domain::types::FlagType;

#[derive(Debug, Clone, Default)]
pub struct CreateFlagCommand {
    pub key: String,
    pub display_name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub flag_type: Option<FlagType>,
    pub value: String,
    pub tag_ids: Vec<Uuid>,
}

/// Partial update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct UpdateFlagCommand {
    pub display_name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub enabled: Option<bool>,
    pub flag_type: Option<FlagType>,
    pub value: Option<String>,
    pub tag_ids: Option<Vec<Uuid>>,
}

#[derive(Clone)]
pub struct AdminFlagService {
    applications: Arc<dyn ApplicationsRepo>,
    reader: Arc<dyn FlagsRepo>,
    writer: Arc<dyn FlagsWriteRepo>,
    tags: Arc<dyn TagsRepo>,
    flag_tags: Arc<dyn FlagTagsWriteRepo>,
    cache: Arc<DistributionCache>,
}

impl AdminFlagService {
    pub fn new(
        applications: Arc<dyn ApplicationsRepo>,
        reader: Arc<dyn FlagsRepo>,
        writer: Arc<dyn FlagsWriteRepo>,
        tags: Arc<dyn TagsRepo>,
        flag_tags: Arc<dyn FlagTagsWriteRepo>,
        cache: Arc<DistributionCache>,
    ) -> Self {
        Self {
            applications,
            reader,
            writer,
            tags,
            flag_tags,
            cache,
        }
    }

    /// Flags of the application in creation order, each with its tags.
    pub async fn list(
        &self,
        principal: &Principal,
        application_id: Uuid,
    ) -> Result<Vec<FlagWithTags>, AdminError> {
        let application =
            readable_application(self.applications.as_ref(), principal, application_id).await?;
        let flags = self.reader.list_flags(application.id).await?;
        Ok(with_tags(self.tags.as_ref(), flags).await?)
    }

    pub async fn create(
        &self,
        principal: &Principal,
        application_id: Uuid,
        command: CreateFlagCommand,
    ) -> Result<FlagWithTags, AdminError> {
        let application =
            writable_application(self.applications.as_ref(), principal, application_id).await?;

        let key = require_trimmed(&command.key, "key")?;
        let display_name = require_trimmed(&command.display_name, "displayName")?;
        let flag_type = command.flag_type.unwrap_or_default();
        validate_flag_value(flag_type, &command.value)?;

        if self
            .reader
            .find_flag_by_key(application.id, &key)
            .await?
            .is_some()
        {
            return Err(AdminError::conflict(format!(
                "flag `{key}` already exists in this application"
            )));
        }

        let tag_ids = self.owned_tag_ids(&application, &command.tag_ids).await?;
        let flag = self
            .writer
            .create_flag(
                CreateFlagParams {
                    application_id: application.id,
                    key,
                    display_name,
                    description: optional_trimmed(command.description),
                    enabled: command.enabled,
                    flag_type,
                    value: command.value,
                },
                &tag_ids,
            )
            .await?;
        self.cache.invalidate(&application.access_key);

        info!(
            target: "flagcast::admin",
            application_id = %application.id,
            flag = %flag.key,
            "flag created"
        );
        self.resolve(flag).await
    }

    pub async fn update(
        &self,
        principal: &Principal,
        application_id: Uuid,
        flag_id: Uuid,
        command: UpdateFlagCommand,
    ) -> Result<FlagWithTags, AdminError> {
        let application =
            writable_application(self.applications.as_ref(), principal, application_id).await?;
        let existing = self.flag_in(&application, flag_id).await?;

        let display_name = match command.display_name {
            Some(name) => require_trimmed(&name, "displayName")?,
            None => existing.display_name,
        };
        let description = match command.description {
            Some(description) => optional_trimmed(description),
            None => existing.description,
        };
        let flag_type = command.flag_type.unwrap_or(existing.flag_type);
        let value = command.value.unwrap_or(existing.value);
        validate_flag_value(flag_type, &value)?;

        let tag_ids = match command.tag_ids {
            Some(ids) => Some(self.owned_tag_ids(&application, &ids).await?),
            None => None,
        };

        let flag = self
            .writer
            .update_flag(
                UpdateFlagParams {
                    id: existing.id,
                    display_name,
                    description,
                    enabled: command.enabled.unwrap_or(existing.enabled),
                    flag_type,
                    value,
                },
                tag_ids.as_deref(),
            )
            .await?;
        self.cache.invalidate(&application.access_key);

        self.resolve(flag).await
    }

    pub async fn delete(
        &self,
        principal: &Principal,
        application_id: Uuid,
        flag_id: Uuid,
    ) -> Result<(), AdminError> {
        let application =
            writable_application(self.applications.as_ref(), principal, application_id).await?;
        let flag = self.flag_in(&application, flag_id).await?;

        self.writer.delete_flag(flag.id).await?;
        self.cache.invalidate(&application.access_key);

        info!(
            target: "flagcast::admin",
            application_id = %application.id,
            flag = %flag.key,
            "flag deleted"
        );
        Ok(())
    }

    /// Make the flag's tag set exactly the given tags of the same application.
    pub async fn assign_tags(
        &self,
        principal: &Principal,
        application_id: Uuid,
        flag_id: Uuid,
        tag_ids: Vec<Uuid>,
    ) -> Result<FlagWithTags, AdminError> {
        let application =
            writable_application(self.applications.as_ref(), principal, application_id).await?;
        let flag = self.flag_in(&application, flag_id).await?;

        let tag_ids = self.owned_tag_ids(&application, &tag_ids).await?;
        self.flag_tags.replace_flag_tags(flag.id, &tag_ids).await?;
        self.cache.invalidate(&application.access_key);

        self.resolve(flag).await
    }

    async fn flag_in(
        &self,
        application: &ApplicationRecord,
        flag_id: Uuid,
    ) -> Result<FlagRecord, AdminError> {
        self.reader
            .find_flag(flag_id)
            .await?
            .filter(|flag| flag.application_id == application.id)
            .ok_or(AdminError::NotFound("flag"))
    }

    async fn owned_tag_ids(
        &self,
        application: &ApplicationRecord,
        requested: &[Uuid],
    ) -> Result<Vec<Uuid>, AdminError> {
        owned_tag_ids(self.tags.as_ref(), application.id, requested).await
    }

    async fn resolve(&self, flag: FlagRecord) -> Result<FlagWithTags, AdminError> {
        let mut resolved = with_tags(self.tags.as_ref(), vec![flag.clone()]).await?;
        Ok(resolved.pop().unwrap_or(FlagWithTags {
            flag,
            tags: Vec::new(),
        }))
    }
}

/// The requested tag ids that name tags of the application; others are dropped.
pub(crate) async fn owned_tag_ids(
    tags: &dyn TagsRepo,
    application_id: Uuid,
    requested: &[Uuid],
) -> Result<Vec<Uuid>, AdminError> {
    if requested.is_empty() {
        return Ok(Vec::new());
    }
    let owned = tags
        .find_tags_in_application(application_id, requested)
        .await?;
    Ok(owned.into_iter().map(|tag| tag.id).collect())
}

/// Attach resolved tags to each flag, keeping the order of `flags`.
pub(crate) async fn with_tags(
    tags: &dyn TagsRepo,
    flags: Vec<FlagRecord>,
) -> Result<Vec<FlagWithTags>, RepoError> {
    if flags.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = flags.iter().map(|flag| flag.id).collect();
    let mut by_flag: HashMap<Uuid, Vec<TagRecord>> = HashMap::new();
    for (flag_id, tag) in tags.list_tags_for_flags(&ids).await? {
        by_flag.entry(flag_id).or_default().push(tag);
    }

    Ok(flags
        .into_iter()
        .map(|flag| {
            let tags = by_flag.remove(&flag.id).unwrap_or_default();
            FlagWithTags { flag, tags }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::Harness;
    use crate::domain::flags::MAX_FLAG_VALUE_CHARS;
    use crate::domain::types::OperatorRole;

    fn command(key: &str, flag_type: FlagType, value: &str) -> CreateFlagCommand {
        CreateFlagCommand {
            key: key.into(),
            display_name: key.to_uppercase(),
            enabled: true,
            flag_type: Some(flag_type),
            value: value.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn json_flags_require_parsable_values_on_create_and_update() {
        let harness = Harness::new();
        let owner = harness.principal(OperatorRole::User);
        let app = harness.application(&owner, "app").await;

        let err = harness
            .flags
            .create(&owner, app.id, command("cfg", FlagType::Json, "{oops"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Validation { .. }));

        let flag = harness
            .flags
            .create(&owner, app.id, command("cfg", FlagType::Json, "{\"a\":1}"))
            .await
            .unwrap();
        let err = harness
            .flags
            .update(
                &owner,
                app.id,
                flag.flag.id,
                UpdateFlagCommand {
                    value: Some("[1,".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Validation { .. }));
    }

    #[tokio::test]
    async fn switching_type_to_json_validates_the_existing_value() {
        let harness = Harness::new();
        let owner = harness.principal(OperatorRole::User);
        let app = harness.application(&owner, "app").await;
        let flag = harness
            .flags
            .create(&owner, app.id, command("mode", FlagType::String, "dark"))
            .await
            .unwrap();

        let err = harness
            .flags
            .update(
                &owner,
                app.id,
                flag.flag.id,
                UpdateFlagCommand {
                    flag_type: Some(FlagType::Json),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Validation { .. }));
    }

    #[tokio::test]
    async fn oversized_values_are_rejected() {
        let harness = Harness::new();
        let owner = harness.principal(OperatorRole::User);
        let app = harness.application(&owner, "app").await;
        let huge = "x".repeat(MAX_FLAG_VALUE_CHARS + 1);

        assert!(
            harness
                .flags
                .create(&owner, app.id, command("big", FlagType::String, &huge))
                .await
                .is_err()
        );

        let flag = harness
            .flags
            .create(&owner, app.id, command("big", FlagType::String, "small"))
            .await
            .unwrap();
        let err = harness
            .flags
            .update(
                &owner,
                app.id,
                flag.flag.id,
                UpdateFlagCommand {
                    value: Some(huge),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Validation { .. }));
    }

    #[tokio::test]
    async fn duplicate_keys_conflict_and_blank_keys_fail_validation() {
        let harness = Harness::new();
        let owner = harness.principal(OperatorRole::User);
        let app = harness.application(&owner, "app").await;
        harness.flag(&owner, &app, "beta", true, "on").await;

        let err = harness
            .flags
            .create(&owner, app.id, command(" beta ", FlagType::String, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Conflict { .. }));

        let err = harness
            .flags
            .create(&owner, app.id, command("  ", FlagType::String, "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Validation { .. }));
    }

    #[tokio::test]
    async fn type_defaults_to_boolean() {
        let harness = Harness::new();
        let owner = harness.principal(OperatorRole::User);
        let app = harness.application(&owner, "app").await;

        let flag = harness
            .flags
            .create(
                &owner,
                app.id,
                CreateFlagCommand {
                    key: "plain".into(),
                    display_name: "Plain".into(),
                    value: "true".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(flag.flag.flag_type, FlagType::Boolean);
    }

    #[tokio::test]
    async fn create_keeps_only_tags_of_the_same_application() {
        let harness = Harness::new();
        let owner = harness.principal(OperatorRole::User);
        let app = harness.application(&owner, "app").await;
        let other = harness.application(&owner, "other").await;
        let local = harness.tag(&owner, &app, "local").await;
        let foreign = harness.tag(&owner, &other, "foreign").await;

        let flag = harness
            .flags
            .create(
                &owner,
                app.id,
                CreateFlagCommand {
                    tag_ids: vec![local.id, foreign.id, Uuid::new_v4()],
                    ..command("beta", FlagType::String, "on")
                },
            )
            .await
            .unwrap();

        assert_eq!(flag.tag_ids(), vec![local.id]);
    }

    #[tokio::test]
    async fn update_replaces_tag_set_only_when_supplied() {
        let harness = Harness::new();
        let owner = harness.principal(OperatorRole::User);
        let app = harness.application(&owner, "app").await;
        let a = harness.tag(&owner, &app, "a").await;
        let b = harness.tag(&owner, &app, "b").await;
        let flag = harness
            .flags
            .create(
                &owner,
                app.id,
                CreateFlagCommand {
                    tag_ids: vec![a.id],
                    ..command("beta", FlagType::String, "on")
                },
            )
            .await
            .unwrap();

        let renamed = harness
            .flags
            .update(
                &owner,
                app.id,
                flag.flag.id,
                UpdateFlagCommand {
                    display_name: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.tag_ids(), vec![a.id]);
        assert_eq!(renamed.flag.value, "on");

        let retagged = harness
            .flags
            .update(
                &owner,
                app.id,
                flag.flag.id,
                UpdateFlagCommand {
                    tag_ids: Some(vec![b.id]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(retagged.tag_ids(), vec![b.id]);
    }

    #[tokio::test]
    async fn writes_are_visible_through_the_cache_immediately() {
        let harness = Harness::new();
        let owner = harness.principal(OperatorRole::User);
        let app = harness.application(&owner, "app").await;
        let beta = harness.flag(&owner, &app, "beta", true, "on").await;
        assert_eq!(harness.cache.get(&app.access_key).await.unwrap().flags.len(), 1);

        harness.flag(&owner, &app, "gamma", true, "1").await;
        assert_eq!(harness.cache.get(&app.access_key).await.unwrap().flags.len(), 2);

        harness
            .flags
            .update(
                &owner,
                app.id,
                beta.flag.id,
                UpdateFlagCommand {
                    value: Some("off".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let entry = harness.cache.get(&app.access_key).await.unwrap();
        assert_eq!(entry.flags[0].value, "off");

        harness
            .flags
            .delete(&owner, app.id, beta.flag.id)
            .await
            .unwrap();
        let entry = harness.cache.get(&app.access_key).await.unwrap();
        let keys: Vec<&str> = entry.flags.iter().map(|flag| flag.key.as_str()).collect();
        assert_eq!(keys, ["gamma"]);
    }

    #[tokio::test]
    async fn flags_outside_the_application_are_not_found() {
        let harness = Harness::new();
        let owner = harness.principal(OperatorRole::User);
        let app = harness.application(&owner, "app").await;
        let other = harness.application(&owner, "other").await;
        let flag = harness.flag(&owner, &other, "beta", true, "on").await;

        let err = harness
            .flags
            .delete(&owner, app.id, flag.flag.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::NotFound("flag")));
    }

    #[tokio::test]
    async fn strangers_cannot_mutate_flags() {
        let harness = Harness::new();
        let owner = harness.principal(OperatorRole::User);
        let stranger = harness.principal(OperatorRole::User);
        let app = harness.application(&owner, "app").await;

        let err = harness
            .flags
            .create(&stranger, app.id, command("beta", FlagType::String, "on"))
            .await
            .unwrap_err();
        assert!(matches!(err, AdminError::Forbidden));
        assert!(matches!(
            harness.flags.list(&stranger, app.id).await,
            Err(AdminError::NotFound("application"))
        ));
    }

    #[tokio::test]
    async fn storage_failure_does_not_invalidate() {
        let harness = Harness::new();
        let owner = harness.principal(OperatorRole::User);
        let app = harness.application(&owner, "app").await;
        harness.flag(&owner, &app, "beta", true, "on").await;
        harness.cache.get(&app.access_key).await.unwrap();

        harness.store.fail_reads(true);
        let err = harness
            .flags
            .create(&owner, app.id, command("gamma", FlagType::String, "x"))
            .await
            .unwrap_err();
        harness.store.fail_reads(false);

        assert!(matches!(err, AdminError::Repo(RepoError::Timeout)));
        assert!(harness.cache.contains(&app.access_key));
    }

    #[tokio::test]
    async fn scheduled_refresh_repairs_a_missed_invalidation() {
        let harness = Harness::new();
        let owner = harness.principal(OperatorRole::User);
        let app = harness.application(&owner, "app").await;
        let beta = harness.flag(&owner, &app, "beta", true, "on").await;
        harness.flag(&owner, &app, "maint", false, "off").await;
        harness.cache.warm_up().await.unwrap();

        harness.store.set_value_out_of_band(beta.flag.id, "changed");
        assert_eq!(
            harness.cache.get(&app.access_key).await.unwrap().flags[0].value,
            "on"
        );

        harness.cache.scheduled_refresh().await.unwrap();
        let entry = harness.cache.get(&app.access_key).await.unwrap();
        assert_eq!(entry.flags.len(), 1);
        assert_eq!(entry.flags[0].key, "beta");
        assert_eq!(entry.flags[0].value, "changed");
    }
}
