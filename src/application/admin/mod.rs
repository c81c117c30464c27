//! Management services behind the `/api/v1` surface.

mod access;
pub mod applications;
pub mod bulk_tags;
pub mod error;
pub mod flags;
pub mod tags;

pub use applications::AdminApplicationService;
pub use bulk_tags::BulkTagService;
pub use error::AdminError;
pub use flags::AdminFlagService;
pub use tags::AdminTagService;
