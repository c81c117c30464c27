use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::application::admin::access::{readable_application, writable_application};
use crate::application::admin::error::{AdminError, require_trimmed};
use crate::application::operators::Principal;
use crate::application::repos::{ApplicationsRepo, ApplicationsWriteRepo, CreateApplicationParams};
use crate::cache::DistributionCache;
use crate::domain::entities::{ApplicationRecord, ApplicationSummary};

#[derive(Debug, Clone)]
pub struct CreateApplicationCommand {
    pub name: String,
}

#[derive(Clone)]
pub struct AdminApplicationService {
    reader: Arc<dyn ApplicationsRepo>,
    writer: Arc<dyn ApplicationsWriteRepo>,
    cache: Arc<DistributionCache>,
}

impl AdminApplicationService {
    pub fn new(
        reader: Arc<dyn ApplicationsRepo>,
        writer: Arc<dyn ApplicationsWriteRepo>,
        cache: Arc<DistributionCache>,
    ) -> Self {
        Self {
            reader,
            writer,
            cache,
        }
    }

    pub async fn create(
        &self,
        principal: &Principal,
        command: CreateApplicationCommand,
    ) -> Result<ApplicationRecord, AdminError> {
        let name = require_trimmed(&command.name, "name")?;

        let application = self
            .writer
            .create_application(CreateApplicationParams {
                name,
                access_key: generate_access_key(),
                owner_id: principal.operator_id,
            })
            .await?;

        info!(
            target: "flagcast::admin",
            application_id = %application.id,
            owner = %principal.email,
            "application created"
        );
        Ok(application)
    }

    /// Applications owned by the principal, most recently updated first.
    pub async fn list(&self, principal: &Principal) -> Result<Vec<ApplicationSummary>, AdminError> {
        Ok(self
            .reader
            .list_owned_applications(principal.operator_id)
            .await?)
    }

    pub async fn get(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<ApplicationRecord, AdminError> {
        readable_application(self.reader.as_ref(), principal, id).await
    }

    pub async fn delete(&self, principal: &Principal, id: Uuid) -> Result<(), AdminError> {
        let application = writable_application(self.reader.as_ref(), principal, id).await?;

        self.writer.delete_application(application.id).await?;
        self.cache.invalidate(&application.access_key);

        info!(
            target: "flagcast::admin",
            application_id = %application.id,
            "application deleted"
        );
        Ok(())
    }
}

/// 32 lowercase hex characters.
fn generate_access_key() -> String {
    Uuid::new_v4().simple().to_string()
}
