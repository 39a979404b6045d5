//! Strata Core - entry, key, clock, configuration and error types
//!
//! Value-agnostic building blocks shared by the cache tiers in
//! `strata-storage`. Nothing in this crate performs I/O.

pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod key;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    resolve, CacheConfig, CacheOptions, DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_AGE,
    DEFAULT_MAX_SIZE, DEFAULT_PREFIX, MAX_CLEANUP_INTERVAL,
};
pub use entry::CacheEntry;
pub use error::{ConfigError, FetchError, StorageError, StrataError, StrataResult};
pub use key::{CacheKey, DEFAULT_NAMESPACE, NAMESPACE_SEPARATOR};
