//! Periodic full reload of the distribution cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::distribution::DistributionCache;

/// Owns the background task running [`DistributionCache::scheduled_refresh`].
///
/// The task lives from [`RefreshScheduler::start`] until
/// [`RefreshScheduler::stop`]; dropping the scheduler without stopping it
/// aborts the task.
pub struct RefreshScheduler {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn start(cache: Arc<DistributionCache>, interval: Duration) -> Self {
        let (shutdown, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // the first tick completes immediately

            info!(
                target: "flagcast::cache",
                interval_secs = interval.as_secs(),
                "distribution refresh scheduler started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = cache.scheduled_refresh().await {
                            warn!(
                                target: "flagcast::cache",
                                error = %err,
                                "scheduled distribution refresh failed"
                            );
                        }
                    }
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!(target: "flagcast::cache", "distribution refresh scheduler stopped");
        });

        Self {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signal the task and wait for an in-progress sweep to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.take()
            && let Err(err) = handle.await
            && !err.is_cancelled()
        {
            warn!(
                target: "flagcast::cache",
                error = %err,
                "distribution refresh task ended abnormally"
            );
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
