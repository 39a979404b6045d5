//! Strata Storage - cache tiers and facade
//!
//! A two-tier cache sitting between an application and its remote data
//! sources:
//!
//! - [`MemoryTier`]: bounded, FIFO-evicting, in-process
//! - [`PersistentTier`]: best-effort, prefix-scoped records in a shared
//!   [`KvMedium`] (in-memory or LMDB)
//! - [`TieredCache`]: the public facade (`set`, `get`, `delete`,
//!   `delete_by_tag`, `clear`, `stats`, `fetch_with_cache`)
//! - [`janitor`]: periodic sweep of expired entries

pub mod fetcher;
pub mod helpers;
pub mod janitor;
pub mod medium;
pub mod memory_tier;
pub mod persistent_tier;
pub mod tiered;

pub use fetcher::{HttpFetcher, ResourceFetcher};
pub use helpers::{MarketDataCache, PanelConfigCache, PositionCache};
pub use janitor::{
    janitor_task, spawn_janitor, JanitorHandle, JanitorMetrics, JanitorMetricsSnapshot,
    SweepReport,
};
pub use medium::{InMemoryMedium, KvMedium, LmdbMedium, LmdbMediumError};
pub use memory_tier::MemoryTier;
pub use persistent_tier::{PersistentTier, PersistentUsage};
pub use tiered::{
    CacheStats, FetchOptions, MemoryStats, SetOptions, StorageStats, TieredCache,
    TieredCacheBuilder, DEFAULT_FETCH_NAMESPACE, DEFAULT_FETCH_TAG,
};
