//! The stored cache record.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StrataResult};
use crate::key::CacheKey;

/// Shortest lifetime an entry can be given, so `expires_at > created_at`
/// holds even for a zero TTL.
const MIN_TTL: Duration = Duration::from_millis(1);

/// A single cached value with its expiry metadata.
///
/// The text record written to a persistent medium is the JSON object
/// `{"key","data","expiresAt","createdAt","tags"}` with epoch-millisecond
/// timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Composite `namespace:key`.
    pub key: String,
    /// Opaque payload.
    pub data: serde_json::Value,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,
    /// Insertion instant; used for eviction ordering only.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl CacheEntry {
    /// Create an entry that lives for `ttl` starting at `now`.
    pub fn new<I, S>(
        key: &CacheKey,
        data: serde_json::Value,
        ttl: Duration,
        tags: I,
        now: DateTime<Utc>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = truncate_to_millis(now);
        let ttl = TimeDelta::from_std(ttl.max(MIN_TTL)).unwrap_or(TimeDelta::MAX);
        Self {
            key: key.as_str().to_string(),
            data,
            expires_at: now
                .checked_add_signed(ttl)
                .unwrap_or_else(|| truncate_to_millis(DateTime::<Utc>::MAX_UTC)),
            created_at: now,
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// An entry is readable while `now <= expires_at`.
    pub fn is_readable(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }

    /// Sweep criterion: strictly past the expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn in_namespace(&self, namespace: &str) -> bool {
        self.key.starts_with(&CacheKey::namespace_prefix(namespace))
    }

    /// Encode as the persistent text record.
    pub fn to_record(&self) -> StrataResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a persistent text record read from `storage_key`.
    pub fn from_record(storage_key: &str, text: &str) -> Result<Self, StorageError> {
        serde_json::from_str(text).map_err(|e| StorageError::Corrupt {
            key: storage_key.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Stored timestamps have millisecond resolution; truncating up front keeps
/// a record identical after a trip through the persistent medium.
fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).expect("valid timestamp")
    }

    #[test]
    fn test_new_entry_expiry() {
        let key = CacheKey::new("trading", "market_BTC");
        let entry = CacheEntry::new(
            &key,
            json!({"price": 65000}),
            Duration::from_secs(30),
            ["market"],
            at(1_000),
        );

        assert_eq!(entry.key, "trading:market_BTC");
        assert_eq!(entry.created_at, at(1_000));
        assert_eq!(entry.expires_at, at(31_000));
        assert!(entry.has_tag("market"));
        assert!(entry.in_namespace("trading"));
    }

    #[test]
    fn test_readable_boundary() {
        let key = CacheKey::new("default", "k");
        let entry = CacheEntry::new(&key, json!(1), Duration::from_secs(1), Vec::<String>::new(), at(0));

        assert!(entry.is_readable(at(1_000)));
        assert!(!entry.is_expired(at(1_000)));
        assert!(!entry.is_readable(at(1_001)));
        assert!(entry.is_expired(at(1_001)));
    }

    #[test]
    fn test_zero_ttl_still_expires_after_creation() {
        let key = CacheKey::new("default", "k");
        let entry = CacheEntry::new(&key, json!(null), Duration::ZERO, Vec::<String>::new(), at(5));
        assert!(entry.expires_at > entry.created_at);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let key = CacheKey::new("default", "k");
        let entry = CacheEntry::new(&key, json!(1), Duration::MAX, Vec::<String>::new(), at(0));
        assert!(entry.is_readable(at(4_000_000_000_000)));
    }

    #[test]
    fn test_record_field_names() {
        let key = CacheKey::new("api", "ticker");
        let entry = CacheEntry::new(&key, json!([1, 2]), Duration::from_secs(2), ["api"], at(10));
        let text = entry.to_record().expect("encode should succeed");
        let raw: serde_json::Value = serde_json::from_str(&text).expect("valid json");

        assert_eq!(raw["key"], "api:ticker");
        assert_eq!(raw["expiresAt"], 2_010);
        assert_eq!(raw["createdAt"], 10);
        assert_eq!(raw["tags"], json!(["api"]));

        let decoded = CacheEntry::from_record("cache_api:ticker", &text).expect("decode should succeed");
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_corrupt_record() {
        let err = CacheEntry::from_record("cache_x", "{\"key\":").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn test_in_namespace_does_not_match_nested_namespace() {
        let nested = CacheEntry::new(
            &CacheKey::new("a:b", "k"),
            json!(1),
            Duration::from_secs(1),
            Vec::<String>::new(),
            at(0),
        );
        assert!(nested.in_namespace("a:b"));
        assert!(!nested.in_namespace("a"));
    }
}
