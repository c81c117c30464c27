use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;
use dashmap::DashMap;

const PRUNE_EVERY: u64 = 1024;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited { retry_after_secs: u64 },
}

/// Sliding-window limiter keyed by an arbitrary caller identity.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    buckets: Arc<DashMap<String, Vec<Instant>>>,
    calls: Arc<AtomicU64>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            buckets: Arc::new(DashMap::new()),
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn check(&self, key: &str) -> RateDecision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        if self.calls.fetch_add(1, Ordering::Relaxed) % PRUNE_EVERY == PRUNE_EVERY - 1 {
            self.prune(now);
        }

        let window = self.window;
        let mut entry = self.buckets.entry(key.to_string()).or_default();
        entry.retain(|instant| now.duration_since(*instant) < window);

        let remaining = self.max_requests.saturating_sub(entry.len() as u32);
        if remaining == 0 {
            let retry_after = entry
                .first()
                .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(window);
            return RateDecision::Limited {
                retry_after_secs: retry_after.as_secs().max(1),
            };
        }

        entry.push(now);
        RateDecision::Allowed {
            remaining: remaining - 1,
        }
    }

    /// Drop buckets whose requests all fell out of the window.
    fn prune(&self, now: Instant) {
        let window = self.window;
        self.buckets.retain(|_, instants| {
            instants.retain(|instant| now.duration_since(*instant) < window);
            !instants.is_empty()
        });
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    /// Advertise the caller's budget on a response that was let through.
    pub fn annotate(&self, response: &mut Response, remaining: u32) {
        let headers = response.headers_mut();
        headers.insert(
            HeaderName::from_static(LIMIT_HEADER),
            HeaderValue::from(self.limit()),
        );
        headers.insert(
            HeaderName::from_static(REMAINING_HEADER),
            HeaderValue::from(remaining),
        );
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}
