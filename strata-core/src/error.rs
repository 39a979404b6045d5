//! Error types for strata operations

use thiserror::Error;

/// Persistent medium errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage quota exceeded while writing {key}")]
    QuotaExceeded { key: String },

    #[error("Storage backend failure: {reason}")]
    Backend { reason: String },

    #[error("Corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Returns true when the medium rejected a write for lack of space.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. })
    }
}

/// Errors raised by a fetch collaborator.
///
/// These are never absorbed by the cache; `fetch_with_cache` hands them
/// back to the caller unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request for {resource} failed with status {status}: {body}")]
    Status {
        resource: String,
        status: u16,
        body: String,
    },

    #[error("Transport failure for {resource}: {reason}")]
    Transport { resource: String, reason: String },

    #[error("Invalid payload from {resource}: {reason}")]
    Decode { resource: String, reason: String },
}

/// Configuration errors.
///
/// The resolver never returns these; it substitutes defaults and reports
/// the rejected value through this type's display form.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all strata errors.
#[derive(Debug, Clone, Error)]
pub enum StrataError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },
}

impl From<serde_json::Error> for StrataError {
    fn from(e: serde_json::Error) -> Self {
        StrataError::Serialization {
            reason: e.to_string(),
        }
    }
}

/// Result type alias for strata operations.
pub type StrataResult<T> = Result<T, StrataError>;

// =============================================================================
// TESTS
// =============================================================================
