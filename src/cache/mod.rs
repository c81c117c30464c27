//! Flagcast distribution cache.
//!
//! Keeps the enabled flags of every application in memory, keyed by access
//! key, so the SDK endpoint never touches the database on a hit. Entries are
//! filled lazily on a miss, preloaded at startup, dropped by management
//! writes, and reloaded wholesale by a periodic sweep.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! refresh_interval_seconds = 60
//! warm_on_startup = true
//! ```

mod config;
mod distribution;
mod lock;
mod refresh;

pub use config::CacheConfig;
pub use distribution::{
    CacheError, DistributionCache, DistributionEntry, RefreshReason, RefreshSummary,
};
pub use refresh::RefreshScheduler;
