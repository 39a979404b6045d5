//! LMDB-backed durable medium.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! string store that survives process restarts. The map size bounds the
//! medium; a write that would overflow it surfaces as `QuotaExceeded`.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The medium uses:
//! - Read transactions for `get_item` and `keys`
//! - Write transactions for `set_item` and `remove_item`

use std::path::Path;

use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions, MdbError};
use strata_core::{StorageError, StrataError, StrataResult};

use super::KvMedium;

/// Error type for LMDB medium operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbMediumError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// The map is full.
    #[error("LMDB map full while writing {0}")]
    MapFull(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbMediumError> for StrataError {
    fn from(e: LmdbMediumError) -> Self {
        match e {
            LmdbMediumError::MapFull(key) => StorageError::QuotaExceeded { key }.into(),
            other => StorageError::Backend {
                reason: other.to_string(),
            }
            .into(),
        }
    }
}

/// Durable key-value medium stored in an LMDB environment.
///
/// # Example
///
/// ```ignore
/// use strata_storage::medium::{KvMedium, LmdbMedium};
///
/// let medium = LmdbMedium::open("/var/lib/dashboard/cache", 16)?;
/// medium.set_item("theme", "dark")?;
/// ```
pub struct LmdbMedium {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Str, Str>,
}

impl LmdbMedium {
    /// Open (or create) a medium.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the map in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbMediumError> {
        let map_size = max_size_mb
            .max(1)
            .checked_mul(1024 * 1024)
            .ok_or_else(|| {
                LmdbMediumError::EnvOpen(format!("map size of {max_size_mb} MB overflows usize"))
            })?;

        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per directory by this type
        // and never resized while transactions are alive.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbMediumError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbMediumError::Transaction(e.to_string()))?;

        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbMediumError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbMediumError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    fn write_error(key: &str, e: heed::Error) -> LmdbMediumError {
        match e {
            heed::Error::Mdb(MdbError::MapFull) => LmdbMediumError::MapFull(key.to_string()),
            other => LmdbMediumError::Transaction(other.to_string()),
        }
    }
}

impl KvMedium for LmdbMedium {
    fn get_item(&self, key: &str) -> StrataResult<Option<String>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbMediumError::Transaction(e.to_string()))?;

        let value = self
            .db
            .get(&rtxn, key)
            .map_err(|e| LmdbMediumError::Transaction(e.to_string()))?;

        Ok(value.map(str::to_string))
    }

    fn set_item(&self, key: &str, value: &str) -> StrataResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbMediumError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, key, value)
            .map_err(|e| Self::write_error(key, e))?;

        wtxn.commit().map_err(|e| Self::write_error(key, e))?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StrataResult<bool> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbMediumError::Transaction(e.to_string()))?;

        let deleted = self
            .db
            .delete(&mut wtxn, key)
            .map_err(|e| LmdbMediumError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbMediumError::Transaction(e.to_string()))?;

        Ok(deleted)
    }

    fn keys(&self) -> StrataResult<Vec<String>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbMediumError::Transaction(e.to_string()))?;

        let iter = self
            .db
            .iter(&rtxn)
            .map_err(|e| LmdbMediumError::Transaction(e.to_string()))?;

        let mut keys = Vec::new();
        for result in iter {
            match result {
                Ok((key, _)) => keys.push(key.to_string()),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable LMDB record"),
            }
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_medium() -> (LmdbMedium, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let medium = LmdbMedium::open(temp_dir.path(), 10).expect("medium creation should succeed");
        (medium, temp_dir)
    }

    #[test]
    fn test_put_and_get() {
        let (medium, _temp_dir) = create_test_medium();

        medium
            .set_item("cache_trading:market_BTC", "{\"price\":65000}")
            .expect("set should succeed");

        let value = medium
            .get_item("cache_trading:market_BTC")
            .expect("get should succeed");
        assert_eq!(value.as_deref(), Some("{\"price\":65000}"));
    }

    #[test]
    fn test_get_nonexistent() {
        let (medium, _temp_dir) = create_test_medium();
        assert!(medium.get_item("missing").expect("get should succeed").is_none());
    }

    #[test]
    fn test_overwrite_and_remove() {
        let (medium, _temp_dir) = create_test_medium();

        medium.set_item("theme", "light").expect("set should succeed");
        medium.set_item("theme", "dark").expect("set should succeed");
        assert_eq!(
            medium.get_item("theme").expect("get should succeed").as_deref(),
            Some("dark")
        );

        assert!(medium.remove_item("theme").expect("remove should succeed"));
        assert!(!medium.remove_item("theme").expect("remove should succeed"));
    }

    #[test]
    fn test_keys_and_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let medium = LmdbMedium::open(temp_dir.path(), 10).expect("open should succeed");
            medium.set_item("cache_a", "1").expect("set should succeed");
            medium.set_item("theme", "dark").expect("set should succeed");
        }

        let medium = LmdbMedium::open(temp_dir.path(), 10).expect("reopen should succeed");
        let keys = medium.keys().expect("keys should succeed");
        assert_eq!(keys, vec!["cache_a".to_string(), "theme".to_string()]);
    }

    #[test]
    fn test_oversized_map_is_rejected() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let err = LmdbMedium::open(temp_dir.path(), usize::MAX)
            .err()
            .expect("open should fail");
        assert!(matches!(err, LmdbMediumError::EnvOpen(_)));
    }

    #[test]
    fn test_map_full_maps_to_quota() {
        let err: StrataError = LmdbMediumError::MapFull("cache_big".to_string()).into();
        assert!(matches!(
            err,
            StrataError::Storage(StorageError::QuotaExceeded { ref key }) if key == "cache_big"
        ));

        let err: StrataError = LmdbMediumError::Transaction("boom".to_string()).into();
        assert!(matches!(err, StrataError::Storage(StorageError::Backend { .. })));
    }
}
