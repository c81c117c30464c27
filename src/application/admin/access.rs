use uuid::Uuid;

use crate::application::admin::error::AdminError;
use crate::application::operators::Principal;
use crate::application::repos::ApplicationsRepo;
use crate::domain::entities::ApplicationRecord;

/// Load an application the principal may read. Applications owned by
/// someone else are reported as missing.
pub(crate) async fn readable_application(
    repo: &dyn ApplicationsRepo,
    principal: &Principal,
    id: Uuid,
) -> Result<ApplicationRecord, AdminError> {
    match repo.find_application(id).await? {
        Some(application) if principal.can_manage(&application) => Ok(application),
        _ => Err(AdminError::NotFound("application")),
    }
}

/// Load an application the principal may modify.
pub(crate) async fn writable_application(
    repo: &dyn ApplicationsRepo,
    principal: &Principal,
    id: Uuid,
) -> Result<ApplicationRecord, AdminError> {
    let application = repo
        .find_application(id)
        .await?
        .ok_or(AdminError::NotFound("application"))?;
    if !principal.can_manage(&application) {
        return Err(AdminError::Forbidden);
    }
    Ok(application)
}
