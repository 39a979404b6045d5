//! Prefix-scoped tier over a shared durable medium.
//!
//! Every record is stored at `prefix + entry.key`. Enumerations (sweep,
//! tag invalidation, clear) list the whole medium and then keep only keys
//! starting with the prefix, so unrelated data sharing the medium is never
//! read or written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use strata_core::{CacheEntry, StorageError, StrataError, StrataResult};

use crate::medium::KvMedium;

/// Footprint of this tier's records in the medium.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistentUsage {
    pub entries: usize,
    pub approx_bytes: usize,
}

/// Best-effort durable tier.
#[derive(Clone)]
pub struct PersistentTier {
    medium: Arc<dyn KvMedium>,
    prefix: String,
}

impl std::fmt::Debug for PersistentTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentTier")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl PersistentTier {
    pub fn new(medium: Arc<dyn KvMedium>, prefix: impl Into<String>) -> Self {
        Self {
            medium,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Write an entry.
    ///
    /// On quota exhaustion, sweeps this tier's expired records and retries
    /// once. A second failure is returned to the caller, who treats
    /// persistence as best-effort.
    pub fn put(&self, entry: &CacheEntry, now: DateTime<Utc>) -> StrataResult<()> {
        let storage_key = self.storage_key(&entry.key);
        let text = entry.to_record()?;

        match self.medium.set_item(&storage_key, &text) {
            Err(StrataError::Storage(ref e)) if e.is_quota_exceeded() => {
                let pruned = self.sweep_expired(now)?;
                tracing::warn!(
                    key = %storage_key,
                    pruned,
                    "Persistent medium full, retrying after sweeping expired records"
                );
                self.medium.set_item(&storage_key, &text)
            }
            other => other,
        }
    }

    /// Read a readable entry.
    ///
    /// Expired and undecodable records are deleted and reported as absent.
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> StrataResult<Option<CacheEntry>> {
        let storage_key = self.storage_key(key);
        let Some(text) = self.medium.get_item(&storage_key)? else {
            return Ok(None);
        };

        match CacheEntry::from_record(&storage_key, &text) {
            Ok(entry) if entry.is_readable(now) => Ok(Some(entry)),
            Ok(_) => {
                self.medium.remove_item(&storage_key)?;
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Removing corrupt cache record");
                self.medium.remove_item(&storage_key)?;
                Ok(None)
            }
        }
    }

    pub fn remove(&self, key: &str) -> StrataResult<bool> {
        self.medium.remove_item(&self.storage_key(key))
    }

    /// Medium keys owned by this tier.
    pub fn own_keys(&self) -> StrataResult<Vec<String>> {
        Ok(self
            .medium
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(&self.prefix))
            .collect())
    }

    /// Remove every decodable record matching `predicate`.
    pub fn remove_where<F>(&self, mut predicate: F) -> StrataResult<usize>
    where
        F: FnMut(&CacheEntry) -> bool,
    {
        let mut removed = 0;
        for storage_key in self.own_keys()? {
            let Some(entry) = self.load(&storage_key)? else {
                continue;
            };
            if predicate(&entry) && self.medium.remove_item(&storage_key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove expired and corrupt records, returning how many went.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> StrataResult<usize> {
        let mut removed = 0;
        for storage_key in self.own_keys()? {
            let Some(text) = self.medium.get_item(&storage_key)? else {
                continue;
            };
            let dead = match CacheEntry::from_record(&storage_key, &text) {
                Ok(entry) => entry.is_expired(now),
                Err(e) => {
                    tracing::warn!(error = %e, "Sweeping corrupt cache record");
                    true
                }
            };
            if dead && self.medium.remove_item(&storage_key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every record under this tier's prefix, and nothing else.
    pub fn clear(&self) -> StrataResult<usize> {
        let mut removed = 0;
        for storage_key in self.own_keys()? {
            if self.medium.remove_item(&storage_key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Count own records and the bytes their keys and texts occupy.
    pub fn usage(&self) -> StrataResult<PersistentUsage> {
        let mut usage = PersistentUsage::default();
        for storage_key in self.own_keys()? {
            if let Some(text) = self.medium.get_item(&storage_key)? {
                usage.entries += 1;
                usage.approx_bytes += storage_key.len() + text.len();
            }
        }
        Ok(usage)
    }

    fn load(&self, storage_key: &str) -> StrataResult<Option<CacheEntry>> {
        let Some(text) = self.medium.get_item(storage_key)? else {
            return Ok(None);
        };
        match CacheEntry::from_record(storage_key, &text) {
            Ok(entry) => Ok(Some(entry)),
            Err(StorageError::Corrupt { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
