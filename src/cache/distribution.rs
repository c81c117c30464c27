//! Read-through cache of client-ready flag sets keyed by access key.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::{counter, gauge, histogram};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::application::repos::{DistributionRepo, RepoError};
use crate::domain::entities::{DistributedFlag, DistributionSet};

use super::lock::{rw_read, rw_write};

const METRIC_CACHE_HIT: &str = "flagcast_cache_hit_total";
const METRIC_CACHE_MISS: &str = "flagcast_cache_miss_total";
const METRIC_CACHE_INVALIDATE: &str = "flagcast_cache_invalidate_total";
const METRIC_CACHE_ENTRIES: &str = "flagcast_cache_entries";
const METRIC_CACHE_REFRESH_MS: &str = "flagcast_cache_refresh_ms";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no application uses access key `{0}`")]
    UnknownAccessKey(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("failed to encode distribution payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Enabled flags of one application, with the response body pre-rendered.
#[derive(Debug)]
pub struct DistributionEntry {
    pub flags: Vec<DistributedFlag>,
    pub body: Bytes,
}

impl DistributionEntry {
    fn build(flags: Vec<DistributedFlag>) -> Result<Self, CacheError> {
        let body = Bytes::from(serde_json::to_vec(&flags)?);
        Ok(Self { flags, body })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    WarmUp,
    Scheduled,
}

impl RefreshReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshReason::WarmUp => "warmup",
            RefreshReason::Scheduled => "refresh",
        }
    }
}

/// Outcome of a full reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Entries written by the reload.
    pub loaded: usize,
    /// Keys left alone because they were invalidated while the reload ran.
    pub skipped: usize,
    /// Entries dropped because their application no longer exists.
    pub evicted: usize,
    pub elapsed: Duration,
}

#[derive(Default)]
struct Slots {
    entries: HashMap<String, Arc<DistributionEntry>>,
    // Bumped on every invalidation; a population only stores its result when
    // the key's generation is unchanged since it started loading.
    generations: HashMap<String, u64>,
}

impl Slots {
    fn generation(&self, key: &str) -> u64 {
        self.generations.get(key).copied().unwrap_or(0)
    }
}

type Gate = Arc<Mutex<()>>;

/// In-process distribution cache shared by the SDK endpoint and the
/// management services.
///
/// Hits clone an `Arc` under a read lock. Misses for the same key are
/// collapsed behind a per-key async gate, and the gate is released from the
/// map as soon as no caller waits on it.
pub struct DistributionCache {
    repo: Arc<dyn DistributionRepo>,
    slots: RwLock<Slots>,
    gates: DashMap<String, Gate>,
}

impl DistributionCache {
    pub fn new(repo: Arc<dyn DistributionRepo>) -> Self {
        Self {
            repo,
            slots: RwLock::new(Slots::default()),
            gates: DashMap::new(),
        }
    }

    /// Return the entry for `access_key`, loading it on a miss.
    ///
    /// Unknown keys fail with [`CacheError::UnknownAccessKey`] and leave no
    /// trace in the cache.
    pub async fn get(&self, access_key: &str) -> Result<Arc<DistributionEntry>, CacheError> {
        if let Some(entry) = self.lookup(access_key) {
            counter!(METRIC_CACHE_HIT).increment(1);
            return Ok(entry);
        }
        counter!(METRIC_CACHE_MISS).increment(1);

        let lease = GateLease::acquire(&self.gates, access_key);
        let _guard = lease.gate.lock().await;

        // Another caller may have populated the key while we waited.
        if let Some(entry) = self.lookup(access_key) {
            return Ok(entry);
        }

        self.populate(access_key).await
    }

    /// Evict the entry for `access_key`. Safe to call for keys never cached.
    pub fn invalidate(&self, access_key: &str) {
        let remaining = {
            let mut slots = rw_write(&self.slots, "invalidate");
            slots.entries.remove(access_key);
            *slots.generations.entry(access_key.to_string()).or_insert(0) += 1;
            slots.entries.len()
        };

        counter!(METRIC_CACHE_INVALIDATE).increment(1);
        gauge!(METRIC_CACHE_ENTRIES).set(remaining as f64);
        debug!(target: "flagcast::cache", access_key, "distribution entry invalidated");
    }

    /// Preload every application's entry before traffic arrives.
    pub async fn warm_up(&self) -> Result<RefreshSummary, CacheError> {
        self.reload_all(RefreshReason::WarmUp).await
    }

    /// Reload every entry from storage, bounding staleness left by a missed
    /// invalidation.
    pub async fn scheduled_refresh(&self) -> Result<RefreshSummary, CacheError> {
        self.reload_all(RefreshReason::Scheduled).await
    }

    pub fn len(&self) -> usize {
        rw_read(&self.slots, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, access_key: &str) -> bool {
        rw_read(&self.slots, "contains")
            .entries
            .contains_key(access_key)
    }

    #[cfg(test)]
    pub(crate) fn generation(&self, access_key: &str) -> u64 {
        rw_read(&self.slots, "generation").generation(access_key)
    }

    fn lookup(&self, access_key: &str) -> Option<Arc<DistributionEntry>> {
        rw_read(&self.slots, "lookup").entries.get(access_key).cloned()
    }

    // Sweeps do not bump generations, so a load that overlaps a sweep may
    // store a snapshot older than the sweep's until the next invalidation or sweep.
    async fn populate(&self, access_key: &str) -> Result<Arc<DistributionEntry>, CacheError> {
        let generation = rw_read(&self.slots, "populate").generation(access_key);

        let set = self
            .repo
            .load_distribution(access_key)
            .await?
            .ok_or_else(|| CacheError::UnknownAccessKey(access_key.to_string()))?;
        let entry = Arc::new(DistributionEntry::build(set.flags)?);

        let (stored, len) = {
            let mut slots = rw_write(&self.slots, "populate");
            let current = slots.generation(access_key) == generation;
            if current {
                slots
                    .entries
                    .insert(access_key.to_string(), Arc::clone(&entry));
            }
            (current, slots.entries.len())
        };

        gauge!(METRIC_CACHE_ENTRIES).set(len as f64);
        debug!(
            target: "flagcast::cache",
            access_key,
            flags = entry.flags.len(),
            stored,
            "distribution entry populated"
        );

        Ok(entry)
    }

    async fn reload_all(&self, reason: RefreshReason) -> Result<RefreshSummary, CacheError> {
        let started = Instant::now();
        let generations = rw_read(&self.slots, "reload_all").generations.clone();

        let sets = self.repo.load_all_distributions().await?;
        let mut prepared = Vec::with_capacity(sets.len());
        for DistributionSet { access_key, flags } in sets {
            prepared.push((access_key, Arc::new(DistributionEntry::build(flags)?)));
        }

        let mut summary = RefreshSummary::default();
        let len = {
            let mut slots = rw_write(&self.slots, "reload_all");
            let live: HashSet<&str> = prepared.iter().map(|(key, _)| key.as_str()).collect();

            let vanished: Vec<String> = slots
                .entries
                .keys()
                .filter(|key| !live.contains(key.as_str()))
                .cloned()
                .collect();
            for key in vanished {
                slots.entries.remove(&key);
                summary.evicted += 1;
            }
            // Generations of deleted applications are only needed while a
            // miss for them is still in flight.
            slots
                .generations
                .retain(|key, _| live.contains(key.as_str()) || self.gates.contains_key(key));

            for (key, entry) in &prepared {
                let before = generations.get(key).copied().unwrap_or(0);
                if slots.generation(key) != before {
                    summary.skipped += 1;
                    continue;
                }
                slots.entries.insert(key.clone(), Arc::clone(entry));
                summary.loaded += 1;
            }

            slots.entries.len()
        };

        summary.elapsed = started.elapsed();
        gauge!(METRIC_CACHE_ENTRIES).set(len as f64);
        histogram!(METRIC_CACHE_REFRESH_MS, "reason" => reason.as_str())
            .record(summary.elapsed.as_secs_f64() * 1000.0);
        info!(
            target: "flagcast::cache",
            reason = reason.as_str(),
            loaded = summary.loaded,
            skipped = summary.skipped,
            evicted = summary.evicted,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "distribution cache reloaded"
        );

        Ok(summary)
    }
}

/// Holds a per-key gate and removes it from the map when the last user leaves.
struct GateLease<'a> {
    gates: &'a DashMap<String, Gate>,
    key: &'a str,
    gate: Gate,
}

impl<'a> GateLease<'a> {
    fn acquire(gates: &'a DashMap<String, Gate>, key: &'a str) -> Self {
        let gate = gates.entry(key.to_string()).or_default().value().clone();
        Self { gates, key, gate }
    }
}

impl Drop for GateLease<'_> {
    fn drop(&mut self) {
        let gate = std::mem::take(&mut self.gate);
        // Clones are only taken and released under the shard lock, so a count
        // of one means nobody else waits on this key.
        if let Entry::Occupied(entry) = self.gates.entry(self.key.to_string()) {
            let ours = Arc::ptr_eq(entry.get(), &gate);
            drop(gate);
            if ours && Arc::strong_count(entry.get()) == 1 {
                entry.remove();
            }
        }
    }
}
