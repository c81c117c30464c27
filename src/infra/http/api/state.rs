use std::sync::Arc;

use crate::application::admin::{
    AdminApplicationService, AdminFlagService, AdminTagService, BulkTagService,
};
use crate::application::operators::OperatorService;
use crate::infra::http::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub operators: Arc<OperatorService>,
    pub applications: Arc<AdminApplicationService>,
    pub flags: Arc<AdminFlagService>,
    pub tags: Arc<AdminTagService>,
    pub bulk_tags: Arc<BulkTagService>,
    pub rate_limiter: Arc<RateLimiter>,
}
