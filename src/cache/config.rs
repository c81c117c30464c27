//! Distribution cache configuration.

use std::time::Duration;

const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Period of the background sweep that reloads every entry.
    pub refresh_interval: Duration,
    /// Preload every application's flags before serving traffic.
    pub warm_on_startup: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            warm_on_startup: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            refresh_interval: settings.refresh_interval,
            warm_on_startup: settings.warm_on_startup,
        }
    }
}
