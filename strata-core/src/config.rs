//! Cache configuration and option resolution.
//!
//! Callers hand over a partial [`CacheOptions`]; [`resolve`] fills every unset
//! or invalid field from the library defaults and never fails. Options can be
//! deserialized from a JSON/structured source (unknown fields are ignored) or
//! read from `STRATA_CACHE_*` environment variables.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// Default entry lifetime (5 minutes).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);
/// Default in-memory entry bound.
pub const DEFAULT_MAX_SIZE: usize = 100;
/// Default persistent-medium key prefix.
pub const DEFAULT_PREFIX: &str = "cache_";
/// Default Janitor period (5 minutes).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);
/// Longest accepted Janitor period (30 days).
pub const MAX_CLEANUP_INTERVAL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Partial configuration supplied by the caller or a configuration provider.
///
/// Durations are expressed in milliseconds when deserialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheOptions {
    #[serde(deserialize_with = "millis_opt")]
    pub max_age: Option<Duration>,
    pub max_size: Option<usize>,
    pub enable_memory: Option<bool>,
    pub enable_storage: Option<bool>,
    pub prefix: Option<String>,
    #[serde(deserialize_with = "millis_opt")]
    pub cleanup_interval: Option<Duration>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read options from `STRATA_CACHE_*` environment variables.
    ///
    /// Variables that are missing or fail to parse are left unset so the
    /// resolver falls back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read options through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let secs = |name: &str| {
            lookup(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        };
        let flag = |name: &str| lookup(name).and_then(|v| parse_bool(&v));

        Self {
            max_age: secs("STRATA_CACHE_MAX_AGE_SECS"),
            max_size: lookup("STRATA_CACHE_MAX_SIZE").and_then(|v| v.trim().parse().ok()),
            enable_memory: flag("STRATA_CACHE_ENABLE_MEMORY"),
            enable_storage: flag("STRATA_CACHE_ENABLE_STORAGE"),
            prefix: lookup("STRATA_CACHE_PREFIX"),
            cleanup_interval: secs("STRATA_CACHE_CLEANUP_INTERVAL_SECS"),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn millis_opt<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
}

/// Fully populated cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    /// Lifetime given to entries whose `set` names no TTL.
    pub max_age: Duration,
    /// Maximum number of entries held by the memory tier.
    pub max_size: usize,
    /// Whether the memory tier is used at all.
    pub enable_memory: bool,
    /// Whether every `set` writes through to the persistent tier.
    pub enable_storage: bool,
    /// Prefix prepended to every key this cache writes to the persistent medium.
    pub prefix: String,
    /// How often the Janitor sweeps expired entries.
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            max_size: DEFAULT_MAX_SIZE,
            enable_memory: true,
            enable_storage: false,
            prefix: DEFAULT_PREFIX.to_string(),
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default entry lifetime.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the memory tier bound. Zero is ignored.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        if max_size > 0 {
            self.max_size = max_size;
        }
        self
    }

    /// Enable or disable the memory tier.
    pub fn with_memory(mut self, enabled: bool) -> Self {
        self.enable_memory = enabled;
        self
    }

    /// Enable or disable write-through to the persistent tier.
    pub fn with_storage(mut self, enabled: bool) -> Self {
        self.enable_storage = enabled;
        self
    }

    /// Set the persistent key prefix. An empty prefix is ignored.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if !prefix.is_empty() {
            self.prefix = prefix;
        }
        self
    }

    /// Set the Janitor period. Zero and periods above
    /// [`MAX_CLEANUP_INTERVAL`] are ignored.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() && interval <= MAX_CLEANUP_INTERVAL {
            self.cleanup_interval = interval;
        }
        self
    }
}

/// Merge caller options over the defaults.
///
/// Invalid values are replaced by their default and reported at `warn`.
pub fn resolve(overrides: &CacheOptions) -> CacheConfig {
    let defaults = CacheConfig::default();

    let max_size = match overrides.max_size {
        Some(0) => {
            reject("max_size", "0", "must be greater than zero");
            defaults.max_size
        }
        Some(n) => n,
        None => defaults.max_size,
    };

    let prefix = match overrides.prefix.as_deref() {
        Some("") => {
            reject("prefix", "", "must not be empty");
            defaults.prefix
        }
        Some(p) => p.to_string(),
        None => defaults.prefix,
    };

    let cleanup_interval = match overrides.cleanup_interval {
        Some(d) if d.is_zero() => {
            reject("cleanup_interval", "0ms", "must be greater than zero");
            defaults.cleanup_interval
        }
        Some(d) if d > MAX_CLEANUP_INTERVAL => {
            reject(
                "cleanup_interval",
                &format!("{}s", d.as_secs()),
                "must not exceed 30 days",
            );
            defaults.cleanup_interval
        }
        Some(d) => d,
        None => defaults.cleanup_interval,
    };

    CacheConfig {
        max_age: overrides.max_age.unwrap_or(defaults.max_age),
        max_size,
        enable_memory: overrides.enable_memory.unwrap_or(defaults.enable_memory),
        enable_storage: overrides.enable_storage.unwrap_or(defaults.enable_storage),
        prefix,
        cleanup_interval,
    }
}

fn reject(field: &str, value: &str, reason: &str) {
    let err = ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    tracing::warn!(error = %err, "Ignoring cache option, using default");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_resolve_empty_gives_defaults() {
        let config = resolve(&CacheOptions::default());
        assert_eq!(config.max_age, Duration::from_secs(300));
        assert_eq!(config.max_size, 100);
        assert!(config.enable_memory);
        assert!(!config.enable_storage);
        assert_eq!(config.prefix, "cache_");
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_resolve_keeps_overrides() {
        let options = CacheOptions {
            max_age: Some(Duration::from_secs(30)),
            max_size: Some(5),
            enable_storage: Some(true),
            prefix: Some("dash_".to_string()),
            ..Default::default()
        };
        let config = resolve(&options);
        assert_eq!(config.max_age, Duration::from_secs(30));
        assert_eq!(config.max_size, 5);
        assert!(config.enable_storage);
        assert!(config.enable_memory);
        assert_eq!(config.prefix, "dash_");
    }

    #[test]
    fn test_resolve_replaces_invalid_values() {
        let options = CacheOptions {
            max_size: Some(0),
            prefix: Some(String::new()),
            cleanup_interval: Some(Duration::ZERO),
            ..Default::default()
        };
        let config = resolve(&options);
        assert_eq!(config.max_size, DEFAULT_MAX_SIZE);
        assert_eq!(config.prefix, DEFAULT_PREFIX);
        assert_eq!(config.cleanup_interval, DEFAULT_CLEANUP_INTERVAL);
    }

    #[test]
    fn test_resolve_rejects_oversized_cleanup_interval() {
        let options = CacheOptions::from_lookup(|name| {
            (name == "STRATA_CACHE_CLEANUP_INTERVAL_SECS").then(|| u64::MAX.to_string())
        });
        assert_eq!(options.cleanup_interval, Some(Duration::from_secs(u64::MAX)));

        let config = resolve(&options);
        assert_eq!(config.cleanup_interval, DEFAULT_CLEANUP_INTERVAL);

        let config = resolve(&CacheOptions {
            cleanup_interval: Some(MAX_CLEANUP_INTERVAL),
            ..Default::default()
        });
        assert_eq!(config.cleanup_interval, MAX_CLEANUP_INTERVAL);
    }

    #[test]
    fn test_resolve_accepts_huge_max_size() {
        let config = resolve(&CacheOptions {
            max_size: Some(usize::MAX),
            ..Default::default()
        });
        assert_eq!(config.max_size, usize::MAX);
    }

    #[test]
    fn test_options_deserialize_ignores_unknown_fields() {
        let options: CacheOptions = serde_json::from_str(
            r#"{"maxAge": 30000, "maxSize": 20, "enableStorage": true, "theme": "dark"}"#,
        )
        .expect("options should deserialize");
        assert_eq!(options.max_age, Some(Duration::from_millis(30_000)));
        assert_eq!(options.max_size, Some(20));
        assert_eq!(options.enable_storage, Some(true));
        assert_eq!(options.prefix, None);
    }

    #[test]
    fn test_options_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("STRATA_CACHE_MAX_AGE_SECS", "60"),
            ("STRATA_CACHE_MAX_SIZE", "not-a-number"),
            ("STRATA_CACHE_ENABLE_STORAGE", "yes"),
            ("STRATA_CACHE_PREFIX", "tradecache_"),
        ]
        .into_iter()
        .collect();

        let options = CacheOptions::from_lookup(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(options.max_age, Some(Duration::from_secs(60)));
        assert_eq!(options.max_size, None);
        assert_eq!(options.enable_storage, Some(true));
        assert_eq!(options.enable_memory, None);
        assert_eq!(options.prefix.as_deref(), Some("tradecache_"));
    }

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::new()
            .with_max_age(Duration::from_secs(120))
            .with_max_size(0)
            .with_storage(true)
            .with_prefix("")
            .with_cleanup_interval(Duration::from_secs(60))
            .with_cleanup_interval(Duration::MAX);

        assert_eq!(config.max_age, Duration::from_secs(120));
        assert_eq!(config.max_size, DEFAULT_MAX_SIZE);
        assert!(config.enable_storage);
        assert_eq!(config.prefix, DEFAULT_PREFIX);
        assert_eq!(config.cleanup_interval, Duration::from_secs(60));
    }
}
