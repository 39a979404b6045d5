//! Durable key-value media backing the persistent tier.
//!
//! A medium is a flat string-to-string store that may be shared with data the
//! cache does not own (credentials, theme settings, session flags). The
//! persistent tier only ever touches keys carrying its own prefix; media
//! themselves know nothing about prefixes.

mod in_memory;
mod lmdb;

pub use in_memory::InMemoryMedium;
pub use lmdb::{LmdbMedium, LmdbMediumError};

use strata_core::StrataResult;

/// Synchronous key-value medium.
///
/// Implementations must be thread-safe. A write rejected for lack of space
/// must fail with `StorageError::QuotaExceeded` so the persistent tier can
/// prune expired records and retry.
pub trait KvMedium: Send + Sync {
    /// Read the text stored under `key`.
    fn get_item(&self, key: &str) -> StrataResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: &str) -> StrataResult<()>;

    /// Remove `key`. Returns whether a value was present.
    fn remove_item(&self, key: &str) -> StrataResult<bool>;

    /// Enumerate every key in the medium, including keys the cache does not own.
    fn keys(&self) -> StrataResult<Vec<String>>;
}
