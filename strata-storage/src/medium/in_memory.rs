use std::collections::BTreeMap;
use std::sync::RwLock;

use strata_core::{StorageError, StrataResult};

use super::KvMedium;

/// Session-scoped medium kept in process memory.
///
/// An optional byte quota (sum of key and value lengths) makes writes fail
/// with `QuotaExceeded` the same way a full browser-style storage area does.
#[derive(Debug, Default)]
pub struct InMemoryMedium {
    items: RwLock<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl InMemoryMedium {
    /// Create an unbounded medium.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a medium that rejects writes once `quota_bytes` would be exceeded.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            items: RwLock::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Bytes currently used (key plus value lengths).
    pub fn used_bytes(&self) -> usize {
        self.items
            .read()
            .map(|items| items.iter().map(|(k, v)| k.len() + v.len()).sum())
            .unwrap_or(0)
    }
}

impl KvMedium for InMemoryMedium {
    fn get_item(&self, key: &str) -> StrataResult<Option<String>> {
        let items = self.items.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> StrataResult<()> {
        let mut items = self.items.write().map_err(|_| StorageError::LockPoisoned)?;

        if let Some(quota) = self.quota_bytes {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                }
                .into());
            }
        }

        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StrataResult<bool> {
        let mut items = self.items.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(items.remove(key).is_some())
    }

    fn keys(&self) -> StrataResult<Vec<String>> {
        let items = self.items.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(items.keys().cloned().collect())
    }
}
