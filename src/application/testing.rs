//! In-memory implementation of every repository trait for unit tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::application::admin::applications::{AdminApplicationService, CreateApplicationCommand};
use crate::application::admin::bulk_tags::BulkTagService;
use crate::application::admin::flags::{AdminFlagService, CreateFlagCommand};
use crate::application::admin::tags::{AdminTagService, CreateTagCommand};
use crate::application::operators::Principal;
use crate::application::repos::{
    ApplicationsRepo, ApplicationsWriteRepo, CreateApplicationParams, CreateFlagParams,
    CreateTagParams, DistributionRepo, FlagTagsWriteRepo, FlagsRepo, FlagsWriteRepo,
    OperatorsRepo, RepoError, TagsRepo, TagsWriteRepo, UpdateFlagParams, UpdateTagParams,
    UpsertOperatorParams,
};
use crate::cache::DistributionCache;
use crate::domain::entities::{
    ApplicationRecord, ApplicationSummary, DistributedFlag, DistributionSet, FlagRecord,
    FlagWithTags, OperatorRecord, TagRecord,
};
use crate::domain::types::{FlagType, OperatorRole};

#[derive(Default)]
struct State {
    operators: Vec<OperatorRecord>,
    applications: Vec<ApplicationRecord>,
    flags: Vec<FlagRecord>,
    tags: Vec<TagRecord>,
    flag_tags: BTreeSet<(Uuid, Uuid)>,
    tick: i64,
    // Remaining association writes before an injected failure.
    association_budget: Option<usize>,
}

impl State {
    fn now(&mut self) -> OffsetDateTime {
        self.tick += 1;
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(self.tick)
    }

    fn spend_association_write(&mut self) -> Result<(), RepoError> {
        match self.association_budget.as_mut() {
            Some(0) => Err(RepoError::Persistence("injected association failure".into())),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn replace_tags(&mut self, flag_id: Uuid, tag_ids: &[Uuid]) {
        self.flag_tags.retain(|(flag, _)| *flag != flag_id);
        for tag_id in tag_ids {
            self.flag_tags.insert((flag_id, *tag_id));
        }
    }

    fn distribution(&self, application: &ApplicationRecord) -> DistributionSet {
        let mut flags: Vec<&FlagRecord> = self
            .flags
            .iter()
            .filter(|flag| flag.application_id == application.id && flag.enabled)
            .collect();
        flags.sort_by_key(|flag| flag.created_at);
        DistributionSet {
            access_key: application.access_key.clone(),
            flags: flags.into_iter().map(DistributedFlag::from).collect(),
        }
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn read(&self) -> Result<std::sync::MutexGuard<'_, State>, RepoError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        Ok(self.state())
    }

    /// Make every read fail with a storage timeout.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Allow `writes` more association writes, then fail the rest.
    pub fn fail_association_writes_after(&self, writes: usize) {
        self.state().association_budget = Some(writes);
    }

    /// Rewrite a flag value behind the services' back.
    pub fn set_value_out_of_band(&self, flag_id: Uuid, value: &str) {
        let mut state = self.state();
        if let Some(flag) = state.flags.iter_mut().find(|flag| flag.id == flag_id) {
            flag.value = value.to_string();
        }
    }

    pub fn tag_ids_of(&self, flag_id: Uuid) -> BTreeSet<Uuid> {
        self.state()
            .flag_tags
            .iter()
            .filter(|(flag, _)| *flag == flag_id)
            .map(|(_, tag)| *tag)
            .collect()
    }

    pub fn association_count(&self) -> usize {
        self.state().flag_tags.len()
    }

    /// Flags and tags remaining for the application.
    pub fn rows_of(&self, application_id: Uuid) -> (usize, usize) {
        let state = self.state();
        let flags = state
            .flags
            .iter()
            .filter(|flag| flag.application_id == application_id)
            .count();
        let tags = state
            .tags
            .iter()
            .filter(|tag| tag.application_id == application_id)
            .count();
        (flags, tags)
    }
}

#[async_trait]
impl ApplicationsRepo for MemoryStore {
    async fn find_application(&self, id: Uuid) -> Result<Option<ApplicationRecord>, RepoError> {
        Ok(self
            .read()?
            .applications
            .iter()
            .find(|app| app.id == id)
            .cloned())
    }

    async fn list_owned_applications(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<ApplicationSummary>, RepoError> {
        let state = self.read()?;
        let mut summaries: Vec<ApplicationSummary> = state
            .applications
            .iter()
            .filter(|app| app.owner_id == owner_id)
            .map(|app| ApplicationSummary {
                application: app.clone(),
                flag_count: state
                    .flags
                    .iter()
                    .filter(|flag| flag.application_id == app.id)
                    .count() as u64,
            })
            .collect();
        summaries.sort_by(|a, b| b.application.updated_at.cmp(&a.application.updated_at));
        Ok(summaries)
    }
}

#[async_trait]
impl ApplicationsWriteRepo for MemoryStore {
    async fn create_application(
        &self,
        params: CreateApplicationParams,
    ) -> Result<ApplicationRecord, RepoError> {
        let mut state = self.state();
        if state
            .applications
            .iter()
            .any(|app| app.access_key == params.access_key)
        {
            return Err(RepoError::Duplicate {
                constraint: "applications_access_key_key".into(),
            });
        }
        let now = state.now();
        let record = ApplicationRecord {
            id: Uuid::new_v4(),
            name: params.name,
            access_key: params.access_key,
            owner_id: params.owner_id,
            created_at: now,
            updated_at: now,
        };
        state.applications.push(record.clone());
        Ok(record)
    }

    async fn delete_application(&self, id: Uuid) -> Result<(), RepoError> {
        let mut state = self.state();
        let before = state.applications.len();
        state.applications.retain(|app| app.id != id);
        if state.applications.len() == before {
            return Err(RepoError::NotFound);
        }
        let flag_ids: BTreeSet<Uuid> = state
            .flags
            .iter()
            .filter(|flag| flag.application_id == id)
            .map(|flag| flag.id)
            .collect();
        state.flags.retain(|flag| flag.application_id != id);
        state.tags.retain(|tag| tag.application_id != id);
        state
            .flag_tags
            .retain(|(flag, _)| !flag_ids.contains(flag));
        Ok(())
    }
}

#[async_trait]
impl FlagsRepo for MemoryStore {
    async fn find_flag(&self, id: Uuid) -> Result<Option<FlagRecord>, RepoError> {
        Ok(self.read()?.flags.iter().find(|flag| flag.id == id).cloned())
    }

    async fn find_flag_by_key(
        &self,
        application_id: Uuid,
        key: &str,
    ) -> Result<Option<FlagRecord>, RepoError> {
        Ok(self
            .read()?
            .flags
            .iter()
            .find(|flag| flag.application_id == application_id && flag.key == key)
            .cloned())
    }

    async fn list_flags(&self, application_id: Uuid) -> Result<Vec<FlagRecord>, RepoError> {
        let mut flags: Vec<FlagRecord> = self
            .read()?
            .flags
            .iter()
            .filter(|flag| flag.application_id == application_id)
            .cloned()
            .collect();
        flags.sort_by_key(|flag| flag.created_at);
        Ok(flags)
    }

    async fn find_flags_in_application(
        &self,
        application_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<FlagRecord>, RepoError> {
        let mut flags: Vec<FlagRecord> = self
            .read()?
            .flags
            .iter()
            .filter(|flag| flag.application_id == application_id && ids.contains(&flag.id))
            .cloned()
            .collect();
        flags.sort_by_key(|flag| flag.created_at);
        Ok(flags)
    }
}

#[async_trait]
impl FlagsWriteRepo for MemoryStore {
    async fn create_flag(
        &self,
        params: CreateFlagParams,
        tag_ids: &[Uuid],
    ) -> Result<FlagRecord, RepoError> {
        let mut state = self.state();
        if state
            .flags
            .iter()
            .any(|flag| flag.application_id == params.application_id && flag.key == params.key)
        {
            return Err(RepoError::Duplicate {
                constraint: "flags_application_id_key_key".into(),
            });
        }
        let now = state.now();
        let record = FlagRecord {
            id: Uuid::new_v4(),
            application_id: params.application_id,
            key: params.key,
            display_name: params.display_name,
            description: params.description,
            enabled: params.enabled,
            flag_type: params.flag_type,
            value: params.value,
            created_at: now,
            updated_at: now,
        };
        state.flags.push(record.clone());
        state.replace_tags(record.id, tag_ids);
        Ok(record)
    }

    async fn update_flag(
        &self,
        params: UpdateFlagParams,
        tag_ids: Option<&[Uuid]>,
    ) -> Result<FlagRecord, RepoError> {
        let mut state = self.state();
        let now = state.now();
        let flag = state
            .flags
            .iter_mut()
            .find(|flag| flag.id == params.id)
            .ok_or(RepoError::NotFound)?;
        flag.display_name = params.display_name;
        flag.description = params.description;
        flag.enabled = params.enabled;
        flag.flag_type = params.flag_type;
        flag.value = params.value;
        flag.updated_at = now;
        let record = flag.clone();
        if let Some(tag_ids) = tag_ids {
            state.replace_tags(record.id, tag_ids);
        }
        Ok(record)
    }

    async fn delete_flag(&self, id: Uuid) -> Result<(), RepoError> {
        let mut state = self.state();
        let before = state.flags.len();
        state.flags.retain(|flag| flag.id != id);
        if state.flags.len() == before {
            return Err(RepoError::NotFound);
        }
        state.flag_tags.retain(|(flag, _)| *flag != id);
        Ok(())
    }
}

#[async_trait]
impl TagsRepo for MemoryStore {
    async fn find_tag(&self, id: Uuid) -> Result<Option<TagRecord>, RepoError> {
        Ok(self.read()?.tags.iter().find(|tag| tag.id == id).cloned())
    }

    async fn find_tag_by_name(
        &self,
        application_id: Uuid,
        name: &str,
    ) -> Result<Option<TagRecord>, RepoError> {
        Ok(self
            .read()?
            .tags
            .iter()
            .find(|tag| tag.application_id == application_id && tag.name == name)
            .cloned())
    }

    async fn list_tags(&self, application_id: Uuid) -> Result<Vec<TagRecord>, RepoError> {
        let mut tags: Vec<TagRecord> = self
            .read()?
            .tags
            .iter()
            .filter(|tag| tag.application_id == application_id)
            .cloned()
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn find_tags_in_application(
        &self,
        application_id: Uuid,
        ids: &[Uuid],
    ) -> Result<Vec<TagRecord>, RepoError> {
        Ok(self
            .read()?
            .tags
            .iter()
            .filter(|tag| tag.application_id == application_id && ids.contains(&tag.id))
            .cloned()
            .collect())
    }

    async fn list_tags_for_flags(
        &self,
        flag_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, TagRecord)>, RepoError> {
        let state = self.read()?;
        let mut pairs: Vec<(Uuid, TagRecord)> = state
            .flag_tags
            .iter()
            .filter(|(flag, _)| flag_ids.contains(flag))
            .filter_map(|(flag, tag_id)| {
                state
                    .tags
                    .iter()
                    .find(|tag| tag.id == *tag_id)
                    .map(|tag| (*flag, tag.clone()))
            })
            .collect();
        pairs.sort_by(|a, b| a.1.name.cmp(&b.1.name));
        Ok(pairs)
    }
}

#[async_trait]
impl TagsWriteRepo for MemoryStore {
    async fn create_tag(&self, params: CreateTagParams) -> Result<TagRecord, RepoError> {
        let mut state = self.state();
        if state
            .tags
            .iter()
            .any(|tag| tag.application_id == params.application_id && tag.name == params.name)
        {
            return Err(RepoError::Duplicate {
                constraint: "tags_application_id_name_key".into(),
            });
        }
        let now = state.now();
        let record = TagRecord {
            id: Uuid::new_v4(),
            application_id: params.application_id,
            name: params.name,
            color: params.color,
            created_at: now,
            updated_at: now,
        };
        state.tags.push(record.clone());
        Ok(record)
    }

    async fn update_tag(&self, params: UpdateTagParams) -> Result<TagRecord, RepoError> {
        let mut state = self.state();
        let now = state.now();
        let application_id = state
            .tags
            .iter()
            .find(|tag| tag.id == params.id)
            .map(|tag| tag.application_id)
            .ok_or(RepoError::NotFound)?;
        if state.tags.iter().any(|tag| {
            tag.application_id == application_id && tag.name == params.name && tag.id != params.id
        }) {
            return Err(RepoError::Duplicate {
                constraint: "tags_application_id_name_key".into(),
            });
        }
        let tag = state
            .tags
            .iter_mut()
            .find(|tag| tag.id == params.id)
            .ok_or(RepoError::NotFound)?;
        tag.name = params.name;
        tag.color = params.color;
        tag.updated_at = now;
        Ok(tag.clone())
    }

    async fn delete_tag(&self, id: Uuid) -> Result<(), RepoError> {
        let mut state = self.state();
        let before = state.tags.len();
        state.tags.retain(|tag| tag.id != id);
        if state.tags.len() == before {
            return Err(RepoError::NotFound);
        }
        state.flag_tags.retain(|(_, tag)| *tag != id);
        Ok(())
    }
}

#[async_trait]
impl FlagTagsWriteRepo for MemoryStore {
    async fn replace_flag_tags(&self, flag_id: Uuid, tag_ids: &[Uuid]) -> Result<(), RepoError> {
        let mut state = self.state();
        state.spend_association_write()?;
        state.replace_tags(flag_id, tag_ids);
        Ok(())
    }

    async fn add_flag_tags(&self, flag_id: Uuid, tag_ids: &[Uuid]) -> Result<(), RepoError> {
        let mut state = self.state();
        state.spend_association_write()?;
        for tag_id in tag_ids {
            state.flag_tags.insert((flag_id, *tag_id));
        }
        Ok(())
    }

    async fn remove_flag_tags(&self, flag_id: Uuid, tag_ids: &[Uuid]) -> Result<(), RepoError> {
        let mut state = self.state();
        state.spend_association_write()?;
        state
            .flag_tags
            .retain(|(flag, tag)| *flag != flag_id || !tag_ids.contains(tag));
        Ok(())
    }
}

#[async_trait]
impl DistributionRepo for MemoryStore {
    async fn load_distribution(
        &self,
        access_key: &str,
    ) -> Result<Option<DistributionSet>, RepoError> {
        let state = self.read()?;
        Ok(state
            .applications
            .iter()
            .find(|app| app.access_key == access_key)
            .map(|app| state.distribution(app)))
    }

    async fn load_all_distributions(&self) -> Result<Vec<DistributionSet>, RepoError> {
        let state = self.read()?;
        Ok(state
            .applications
            .iter()
            .map(|app| state.distribution(app))
            .collect())
    }
}

#[async_trait]
impl OperatorsRepo for MemoryStore {
    async fn find_by_token_prefix(
        &self,
        prefix: &str,
    ) -> Result<Option<OperatorRecord>, RepoError> {
        Ok(self
            .read()?
            .operators
            .iter()
            .find(|operator| operator.token_prefix == prefix)
            .cloned())
    }

    async fn upsert_operator(
        &self,
        params: UpsertOperatorParams,
    ) -> Result<OperatorRecord, RepoError> {
        let mut state = self.state();
        let now = state.now();
        if let Some(existing) = state
            .operators
            .iter_mut()
            .find(|operator| operator.email == params.email)
        {
            existing.role = params.role;
            existing.token_prefix = params.token_prefix;
            existing.hashed_secret = params.hashed_secret;
            existing.revoked_at = None;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let record = OperatorRecord {
            id: Uuid::new_v4(),
            email: params.email,
            role: params.role,
            token_prefix: params.token_prefix,
            hashed_secret: params.hashed_secret,
            revoked_at: None,
            created_at: now,
            updated_at: now,
        };
        state.operators.push(record.clone());
        Ok(record)
    }

    async fn revoke_operator(&self, email: &str, at: OffsetDateTime) -> Result<(), RepoError> {
        let mut state = self.state();
        let operator = state
            .operators
            .iter_mut()
            .find(|operator| operator.email == email)
            .ok_or(RepoError::NotFound)?;
        operator.revoked_at = Some(at);
        Ok(())
    }
}

/// Every management service wired to one [`MemoryStore`] and cache.
pub(crate) struct Harness {
    pub store: Arc<MemoryStore>,
    pub cache: Arc<DistributionCache>,
    pub applications: AdminApplicationService,
    pub flags: AdminFlagService,
    pub tags: AdminTagService,
    pub bulk: BulkTagService,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(DistributionCache::new(store.clone()));

        Self {
            applications: AdminApplicationService::new(
                store.clone(),
                store.clone(),
                cache.clone(),
            ),
            flags: AdminFlagService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                cache.clone(),
            ),
            tags: AdminTagService::new(store.clone(), store.clone(), store.clone(), cache.clone()),
            bulk: BulkTagService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                cache.clone(),
            ),
            store,
            cache,
        }
    }

    pub fn principal(&self, role: OperatorRole) -> Principal {
        let id = Uuid::new_v4();
        Principal {
            operator_id: id,
            email: format!("{}@example.com", id.simple()),
            role,
        }
    }

    pub async fn application(&self, owner: &Principal, name: &str) -> ApplicationRecord {
        self.applications
            .create(
                owner,
                CreateApplicationCommand {
                    name: name.to_string(),
                },
            )
            .await
            .expect("create application")
    }

    pub async fn flag(
        &self,
        owner: &Principal,
        application: &ApplicationRecord,
        key: &str,
        enabled: bool,
        value: &str,
    ) -> FlagWithTags {
        self.flags
            .create(
                owner,
                application.id,
                CreateFlagCommand {
                    key: key.to_string(),
                    display_name: key.to_string(),
                    enabled,
                    flag_type: Some(FlagType::String),
                    value: value.to_string(),
                    ..Default::default()
                },
            )
            .await
            .expect("create flag")
    }

    pub async fn tag(
        &self,
        owner: &Principal,
        application: &ApplicationRecord,
        name: &str,
    ) -> TagRecord {
        self.tags
            .create(
                owner,
                application.id,
                CreateTagCommand {
                    name: name.to_string(),
                    color: None,
                },
            )
            .await
            .expect("create tag")
    }
}
