//! Apply one tag operation across a batch of flags.
//!
//! Each flag is written independently, in the order the caller listed them.
//! The first storage failure stops the batch; flags written before it stay
//! written. The owning application's cache entry is invalidated once per
//! batch, including a partially applied one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::admin::access::writable_application;
use crate::application::admin::error::AdminError;
use crate::application::admin::flags::{owned_tag_ids, with_tags};
use crate::application::operators::Principal;
use crate::application::repos::{ApplicationsRepo, FlagTagsWriteRepo, FlagsRepo, TagsRepo};
use crate::cache::DistributionCache;
use crate::domain::entities::{FlagRecord, FlagWithTags};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkTagAction {
    /// Union of the current tags and the requested ones.
    Add,
    /// Current tags minus the requested ones.
    Remove,
    /// Exactly the requested tags.
    Set,
}

impl BulkTagAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BulkTagAction::Add => "add",
            BulkTagAction::Remove => "remove",
            BulkTagAction::Set => "set",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BulkTagCommand {
    pub flag_ids: Vec<Uuid>,
    pub tag_ids: Vec<Uuid>,
    pub action: BulkTagAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkTagOutcome {
    pub updated: usize,
    pub flags: Vec<FlagWithTags>,
}

#[derive(Clone)]
pub struct BulkTagService {
    applications: Arc<dyn ApplicationsRepo>,
    flags: Arc<dyn FlagsRepo>,
    tags: Arc<dyn TagsRepo>,
    flag_tags: Arc<dyn FlagTagsWriteRepo>,
    cache: Arc<DistributionCache>,
}

impl BulkTagService {
    pub fn new(
        applications: Arc<dyn ApplicationsRepo>,
        flags: Arc<dyn FlagsRepo>,
        tags: Arc<dyn TagsRepo>,
        flag_tags: Arc<dyn FlagTagsWriteRepo>,
        cache: Arc<DistributionCache>,
    ) -> Self {
        Self {
            applications,
            flags,
            tags,
            flag_tags,
            cache,
        }
    }

    pub async fn apply(
        &self,
        principal: &Principal,
        application_id: Uuid,
        command: BulkTagCommand,
    ) -> Result<BulkTagOutcome, AdminError> {
        if command.flag_ids.is_empty() {
            return Err(AdminError::validation("flagIds must not be empty"));
        }

        let application =
            writable_application(self.applications.as_ref(), principal, application_id).await?;

        let tag_ids = dedup(
            owned_tag_ids(self.tags.as_ref(), application.id, &command.tag_ids).await?,
        );
        let flag_ids = dedup(command.flag_ids);
        let targets = self.targets(application.id, &flag_ids).await?;

        let mut written: Vec<FlagRecord> = Vec::with_capacity(targets.len());
        let mut failure = None;
        for flag in targets {
            let result = match command.action {
                BulkTagAction::Add => self.flag_tags.add_flag_tags(flag.id, &tag_ids).await,
                BulkTagAction::Remove => self.flag_tags.remove_flag_tags(flag.id, &tag_ids).await,
                BulkTagAction::Set => self.flag_tags.replace_flag_tags(flag.id, &tag_ids).await,
            };
            match result {
                Ok(()) => written.push(flag),
                Err(err) => {
                    failure = Some((flag.id, err));
                    break;
                }
            }
        }

        if !written.is_empty() {
            self.cache.invalidate(&application.access_key);
        }

        if let Some((flag_id, err)) = failure {
            warn!(
                target: "flagcast::admin",
                application_id = %application.id,
                action = command.action.as_str(),
                %flag_id,
                applied = written.len(),
                error = %err,
                "bulk tag update stopped at a failed flag"
            );
            return Err(err.into());
        }

        let flags = with_tags(self.tags.as_ref(), written).await?;
        info!(
            target: "flagcast::admin",
            application_id = %application.id,
            action = command.action.as_str(),
            requested = flag_ids.len(),
            updated = flags.len(),
            "bulk tag update applied"
        );

        Ok(BulkTagOutcome {
            updated: flags.len(),
            flags,
        })
    }

    /// Flags of the application among `ids`, in the order of `ids`.
    async fn targets(
        &self,
        application_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<FlagRecord>, AdminError> {
        let mut found: HashMap<Uuid, FlagRecord> = self
            .flags
            .find_flags_in_application(application_id, ids)
            .await?
            .into_iter()
            .map(|flag| (flag.id, flag))
            .collect();
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }
}

fn dedup(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}
