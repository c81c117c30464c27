use std::sync::Arc;

use uuid::Uuid;

use crate::application::admin::access::{readable_application, writable_application};
use crate::application::admin::error::{AdminError, require_trimmed};
use crate::application::operators::Principal;
use crate::application::repos::{
    ApplicationsRepo, CreateTagParams, TagsRepo, TagsWriteRepo, UpdateTagParams,
};
use crate::cache::DistributionCache;
use crate::domain::entities::{ApplicationRecord, TagRecord};
use crate::domain::flags::normalize_tag_color;

#[derive(Debug, Clone)]
pub struct CreateTagCommand {
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateTagCommand {
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Clone)]
pub struct AdminTagService {
    applications: Arc<dyn ApplicationsRepo>,
    reader: Arc<dyn TagsRepo>,
    writer: Arc<dyn TagsWriteRepo>,
    cache: Arc<DistributionCache>,
}

impl AdminTagService {
    pub fn new(
        applications: Arc<dyn ApplicationsRepo>,
        reader: Arc<dyn TagsRepo>,
        writer: Arc<dyn TagsWriteRepo>,
        cache: Arc<DistributionCache>,
    ) -> Self {
        Self {
            applications,
            reader,
            writer,
            cache,
        }
    }

    pub async fn list(
        &self,
        principal: &Principal,
        application_id: Uuid,
    ) -> Result<Vec<TagRecord>, AdminError> {
        let application =
            readable_application(self.applications.as_ref(), principal, application_id).await?;
        Ok(self.reader.list_tags(application.id).await?)
    }

    pub async fn create(
        &self,
        principal: &Principal,
        application_id: Uuid,
        command: CreateTagCommand,
    ) -> Result<TagRecord, AdminError> {
        let application =
            writable_application(self.applications.as_ref(), principal, application_id).await?;

        let name = require_trimmed(&command.name, "name")?;
        let color = normalize_tag_color(command.color.as_deref())?;
        self.ensure_name_free(&application, &name, None).await?;

        let tag = self
            .writer
            .create_tag(CreateTagParams {
                application_id: application.id,
                name,
                color,
            })
            .await?;
        Ok(tag)
    }

    pub async fn update(
        &self,
        principal: &Principal,
        application_id: Uuid,
        tag_id: Uuid,
        command: UpdateTagCommand,
    ) -> Result<TagRecord, AdminError> {
        let application =
            writable_application(self.applications.as_ref(), principal, application_id).await?;
        let existing = self.tag_in(&application, tag_id).await?;

        let name = match command.name {
            Some(name) => require_trimmed(&name, "name")?,
            None => existing.name.clone(),
        };
        let color = match command.color {
            Some(color) => normalize_tag_color(Some(&color))?,
            None => existing.color.clone(),
        };
        if name != existing.name {
            self.ensure_name_free(&application, &name, Some(existing.id))
                .await?;
        }

        let tag = self
            .writer
            .update_tag(UpdateTagParams {
                id: existing.id,
                name,
                color,
            })
            .await?;
        self.cache.invalidate(&application.access_key);
        Ok(tag)
    }

    /// Delete the tag; flags carrying it keep existing without it.
    pub async fn delete(
        &self,
        principal: &Principal,
        application_id: Uuid,
        tag_id: Uuid,
    ) -> Result<(), AdminError> {
        let application =
            writable_application(self.applications.as_ref(), principal, application_id).await?;
        let tag = self.tag_in(&application, tag_id).await?;

        self.writer.delete_tag(tag.id).await?;
        self.cache.invalidate(&application.access_key);
        Ok(())
    }

    async fn tag_in(
        &self,
        application: &ApplicationRecord,
        tag_id: Uuid,
    ) -> Result<TagRecord, AdminError> {
        self.reader
            .find_tag(tag_id)
            .await?
            .filter(|tag| tag.application_id == application.id)
            .ok_or(AdminError::NotFound("tag"))
    }

    async fn ensure_name_free(
        &self,
        application: &ApplicationRecord,
        name: &str,
        except: Option<Uuid>,
    ) -> Result<(), AdminError> {
        match self.reader.find_tag_by_name(application.id, name).await? {
            Some(tag) if Some(tag.id) != except => Err(AdminError::conflict(format!(
                "tag `{name}` already exists in this application"
            ))),
            _ => Ok(()),
        }
    }
}
