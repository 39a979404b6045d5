//! The cache facade.
//!
//! [`TieredCache`] routes every operation across a bounded memory tier and an
//! optional prefix-scoped persistent tier. None of its operations fail from
//! the caller's point of view except [`TieredCache::fetch_with_cache`], which
//! passes upstream fetch errors through untouched.
//!
//! # Example
//!
//! ```ignore
//! let cache = TieredCache::builder()
//!     .config(resolve(&CacheOptions::from_env()))
//!     .medium(Arc::new(InMemoryMedium::new()))
//!     .build();
//!
//! cache.set("market_BTC", &ticker, &SetOptions::new()
//!     .namespace("trading")
//!     .max_age(Duration::from_secs(30))
//!     .tag("market"));
//!
//! let ticker: Option<Ticker> = cache.get("market_BTC", "trading");
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strata_core::{
    CacheConfig, CacheEntry, CacheKey, Clock, StrataResult, SystemClock, DEFAULT_NAMESPACE,
};

use crate::fetcher::ResourceFetcher;
use crate::janitor::SweepReport;
use crate::medium::KvMedium;
use crate::memory_tier::MemoryTier;
use crate::persistent_tier::PersistentTier;

/// Namespace used by `fetch_with_cache` when none is given.
pub const DEFAULT_FETCH_NAMESPACE: &str = "api";
/// Tag attached by `fetch_with_cache` when none are given.
pub const DEFAULT_FETCH_TAG: &str = "api";

// ============================================================================
// OPTIONS
// ============================================================================

/// Per-call options for [`TieredCache::set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOptions {
    /// Entry lifetime; the configured `max_age` when unset.
    pub max_age: Option<Duration>,
    pub namespace: String,
    pub tags: Vec<String>,
    /// Write to the persistent tier even when it is globally disabled.
    pub force_storage: bool,
}

impl Default for SetOptions {
    fn default() -> Self {
        Self {
            max_age: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            tags: Vec::new(),
            force_storage: false,
        }
    }
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn force_storage(mut self, force: bool) -> Self {
        self.force_storage = force;
        self
    }
}

/// Per-call options for [`TieredCache::fetch_with_cache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Cache key; the resource descriptor when unset.
    pub cache_key: Option<String>,
    pub max_age: Option<Duration>,
    pub namespace: String,
    /// Skip the cache lookup and always call the fetcher.
    pub force_refresh: bool,
    pub tags: Vec<String>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            cache_key: None,
            max_age: None,
            namespace: DEFAULT_FETCH_NAMESPACE.to_string(),
            force_refresh: false,
            tags: vec![DEFAULT_FETCH_TAG.to_string()],
        }
    }
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub entries: usize,
    pub max_size: usize,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub entries: usize,
    pub approx_bytes: usize,
}

/// Snapshot returned by [`TieredCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub memory: MemoryStats,
    pub storage: StorageStats,
    /// Reads served by either tier.
    pub hits: u64,
    /// Reads that found nothing readable.
    pub misses: u64,
    /// Memory entries dropped for capacity.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

// ============================================================================
// FACADE
// ============================================================================

#[derive(Debug)]
struct Tiers {
    memory: MemoryTier,
    persistent: Option<PersistentTier>,
}

impl Tiers {
    fn promote(&mut self, entry: CacheEntry, counters: &Counters) {
        if let Some(evicted) = self.memory.put(entry) {
            counters.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %evicted, "Evicted oldest memory entry");
        }
    }
}

/// Two-tier cache with expiry, FIFO-bounded memory and tag invalidation.
///
/// All tier mutations run under one lock, so no operation ever observes a
/// half-applied `set`, delete, eviction or sweep. The lock is never held
/// across an await point.
pub struct TieredCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    tiers: Mutex<Tiers>,
    counters: Counters,
    /// Per-key gates serializing concurrent fetches of the same key.
    in_flight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`TieredCache`].
#[derive(Default)]
pub struct TieredCacheBuilder {
    config: Option<CacheConfig>,
    clock: Option<Arc<dyn Clock>>,
    medium: Option<Arc<dyn KvMedium>>,
}

impl TieredCacheBuilder {
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Attach the durable medium used by the persistent tier.
    pub fn medium(mut self, medium: Arc<dyn KvMedium>) -> Self {
        self.medium = Some(medium);
        self
    }

    pub fn build(self) -> TieredCache {
        let config = self.config.unwrap_or_default();
        if config.enable_storage && self.medium.is_none() {
            tracing::warn!("Persistent tier enabled without a medium; caching in memory only");
        }
        let persistent = self
            .medium
            .map(|medium| PersistentTier::new(medium, config.prefix.clone()));

        TieredCache {
            tiers: Mutex::new(Tiers {
                memory: MemoryTier::new(config.max_size),
                persistent,
            }),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config,
            counters: Counters::default(),
            in_flight: DashMap::new(),
        }
    }
}

impl TieredCache {
    /// Memory-only cache on the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> TieredCacheBuilder {
        TieredCacheBuilder::default()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn tiers(&self) -> MutexGuard<'_, Tiers> {
        self.tiers.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Cache lock poisoned, continuing with inner state");
            poisoned.into_inner()
        })
    }

    /// Store `data` under `namespace:key`, fully replacing any prior entry.
    ///
    /// Returns false only if `data` cannot be represented as a JSON value.
    /// Persistent-tier failures are logged and absorbed.
    pub fn set<T>(&self, key: &str, data: &T, opts: &SetOptions) -> bool
    where
        T: Serialize + ?Sized,
    {
        let value = match serde_json::to_value(data) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Refusing to cache unserializable value");
                return false;
            }
        };
        self.set_value(&CacheKey::new(&opts.namespace, key), value, opts);
        true
    }

    fn set_value(&self, key: &CacheKey, value: serde_json::Value, opts: &SetOptions) {
        let now = self.clock.now();
        let ttl = opts.max_age.unwrap_or(self.config.max_age);
        let entry = CacheEntry::new(key, value, ttl, opts.tags.iter().cloned(), now);

        let mut tiers = self.tiers();

        if self.config.enable_storage || opts.force_storage {
            if let Some(persistent) = &tiers.persistent {
                if let Err(e) = persistent.put(&entry, now) {
                    tracing::warn!(
                        key = %key,
                        error = %e,
                        "Persistent write failed; entry kept in memory only"
                    );
                }
            }
        }

        if self.config.enable_memory {
            tiers.promote(entry, &self.counters);
        }
    }

    /// Read `namespace:key`, deserializing a copy of the stored value.
    pub fn get<T: DeserializeOwned>(&self, key: &str, namespace: &str) -> Option<T> {
        let value = self.get_value(&CacheKey::new(namespace, key))?;
        match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(e) => {
                tracing::debug!(key, namespace, error = %e, "Cached value has a different shape");
                None
            }
        }
    }

    /// Whether a readable entry exists, without touching hit/miss counters.
    pub fn has(&self, key: &str, namespace: &str) -> bool {
        self.lookup(&CacheKey::new(namespace, key)).is_some()
    }

    fn get_value(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let found = self.lookup(key);
        let counter = if found.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Memory first; on a miss, the persistent tier (if enabled) with
    /// promotion of the hit into memory.
    fn lookup(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let now = self.clock.now();
        let mut tiers = self.tiers();

        if self.config.enable_memory {
            if let Some(entry) = tiers.memory.get(key.as_str(), now) {
                return Some(entry.data.clone());
            }
        }

        if !self.config.enable_storage {
            return None;
        }

        let entry = match tiers.persistent.as_ref()?.get(key.as_str(), now) {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Persistent read failed");
                return None;
            }
        };

        let data = entry.data.clone();
        if self.config.enable_memory {
            tiers.promote(entry, &self.counters);
        }
        Some(data)
    }

    /// Remove `namespace:key` from both tiers.
    pub fn delete(&self, key: &str, namespace: &str) {
        let key = CacheKey::new(namespace, key);
        let mut tiers = self.tiers();
        tiers.memory.remove(key.as_str());
        if let Some(persistent) = &tiers.persistent {
            if let Err(e) = persistent.remove(key.as_str()) {
                tracing::warn!(key = %key, error = %e, "Persistent delete failed");
            }
        }
    }

    /// Remove every entry carrying `tag` from both tiers.
    pub fn delete_by_tag(&self, tag: &str) -> usize {
        let removed = self.remove_where(|entry| entry.has_tag(tag));
        tracing::debug!(tag, removed, "Invalidated entries by tag");
        removed
    }

    /// Remove every entry in `namespace` from both tiers.
    pub fn delete_namespace(&self, namespace: &str) -> usize {
        let removed = self.remove_where(|entry| entry.in_namespace(namespace));
        tracing::debug!(namespace, removed, "Invalidated namespace");
        removed
    }

    fn remove_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&CacheEntry) -> bool,
    {
        let mut tiers = self.tiers();
        let mut removed = tiers.memory.remove_where(&predicate);
        if let Some(persistent) = &tiers.persistent {
            match persistent.remove_where(&predicate) {
                Ok(count) => removed += count,
                Err(e) => tracing::warn!(error = %e, "Persistent invalidation failed"),
            }
        }
        removed
    }

    /// Empty both tiers. Only keys under this cache's prefix are removed
    /// from the persistent medium.
    pub fn clear(&self) {
        let mut tiers = self.tiers();
        tiers.memory.clear();
        if let Some(persistent) = &tiers.persistent {
            if let Err(e) = persistent.clear() {
                tracing::warn!(error = %e, "Persistent clear failed");
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let tiers = self.tiers();
        let entries = tiers.memory.len();
        let max_size = tiers.memory.max_size();

        let storage = match tiers.persistent.as_ref().map(PersistentTier::usage) {
            Some(Ok(usage)) => StorageStats {
                entries: usage.entries,
                approx_bytes: usage.approx_bytes,
            },
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Failed to measure persistent tier");
                StorageStats::default()
            }
            None => StorageStats::default(),
        };

        CacheStats {
            memory: MemoryStats {
                entries,
                max_size,
                usage_percent: entries as f64 / max_size as f64 * 100.0,
            },
            storage,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Remove every expired entry from both tiers.
    pub fn sweep_once(&self) -> SweepReport {
        let now = self.clock.now();
        let mut tiers = self.tiers();

        let memory = tiers.memory.remove_where(|entry| entry.is_expired(now));
        let storage = match &tiers.persistent {
            Some(persistent) => persistent.sweep_expired(now).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Persistent sweep failed");
                0
            }),
            None => 0,
        };

        SweepReport { memory, storage }
    }

    /// Cache-aside read of `resource`.
    ///
    /// A hit returns without calling `fetcher`. On a miss (or with
    /// `force_refresh`) the fetcher runs, and only a successful result is
    /// stored before being returned; fetch errors propagate unchanged.
    ///
    /// Concurrent calls for the same key are serialized: a caller that
    /// waited on another's fetch re-checks the cache first, so the fetcher
    /// runs once per miss rather than once per caller.
    pub async fn fetch_with_cache<T, F>(
        &self,
        fetcher: &F,
        resource: &str,
        opts: &FetchOptions,
    ) -> StrataResult<T>
    where
        T: DeserializeOwned,
        F: ResourceFetcher + ?Sized,
    {
        let value = self.fetch_value(fetcher, resource, opts).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn fetch_value<F>(
        &self,
        fetcher: &F,
        resource: &str,
        opts: &FetchOptions,
    ) -> StrataResult<serde_json::Value>
    where
        F: ResourceFetcher + ?Sized,
    {
        let key = CacheKey::new(
            &opts.namespace,
            opts.cache_key.as_deref().unwrap_or(resource),
        );

        if !opts.force_refresh {
            if let Some(value) = self.lookup(&key) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
        }

        let gate = InFlightGate::join(&self.in_flight, key.as_str());
        let _held = gate.lock().await;

        if !opts.force_refresh {
            // Another caller may have stored the value while we waited.
            if let Some(value) = self.lookup(&key) {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value);
            }
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
        }

        self.fetch_and_store(fetcher, resource, &key, opts).await
    }

    async fn fetch_and_store<F>(
        &self,
        fetcher: &F,
        resource: &str,
        key: &CacheKey,
        opts: &FetchOptions,
    ) -> StrataResult<serde_json::Value>
    where
        F: ResourceFetcher + ?Sized,
    {
        let value = fetcher.fetch(resource).await.map_err(|e| {
            tracing::debug!(resource, error = %e, "Fetch failed; nothing cached");
            e
        })?;

        let set_opts = SetOptions {
            max_age: opts.max_age,
            namespace: opts.namespace.clone(),
            tags: opts.tags.clone(),
            force_storage: false,
        };
        self.set_value(key, value.clone(), &set_opts);
        Ok(value)
    }
}

/// A caller's membership in the per-key fetch gate.
///
/// Dropping it, including when the owning future is cancelled, removes the
/// gate from the map once no other caller holds a reference.
struct InFlightGate<'a> {
    map: &'a DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    key: String,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl<'a> InFlightGate<'a> {
    fn join(map: &'a DashMap<String, Arc<tokio::sync::Mutex<()>>>, key: &str) -> Self {
        let gate = map
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        Self {
            map,
            key: key.to_string(),
            gate,
        }
    }

    async fn lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.gate.lock().await
    }
}

impl Drop for InFlightGate<'_> {
    fn drop(&mut self) {
        // One reference in the map plus ours means nobody else is queued.
        self.map.remove_if(&self.key, |_, g| {
            Arc::ptr_eq(g, &self.gate) && Arc::strong_count(g) <= 2
        });
    }
}
