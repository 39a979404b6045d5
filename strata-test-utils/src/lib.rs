//! Strata Test Utilities
//!
//! Shared test infrastructure for the strata workspace:
//! - Proptest generators for keys, namespaces, tags and payloads
//! - A scripted fetch collaborator that counts its calls
//! - Fixtures building caches over in-memory media with a manual clock

pub use strata_core::{
    resolve, CacheConfig, CacheEntry, CacheKey, CacheOptions, Clock, FetchError, ManualClock,
    StorageError, StrataError, StrataResult,
};
pub use strata_storage::{
    FetchOptions, InMemoryMedium, KvMedium, ResourceFetcher, SetOptions, TieredCache,
};

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// SCRIPTED FETCHER
// ============================================================================

/// Fetch collaborator with scripted responses per resource.
///
/// Each call pops the next scripted response for the resource; once the
/// script runs dry, the last response is repeated. Unknown resources fail
/// with a 404 status error.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<StrataResult<serde_json::Value>>>>,
    last: Mutex<HashMap<String, StrataResult<serde_json::Value>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every fetch sleep first, widening the window for concurrent callers.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful payload for `resource`.
    pub fn respond(self, resource: &str, value: serde_json::Value) -> Self {
        self.push(resource, Ok(value));
        self
    }

    /// Queue an HTTP status failure for `resource`.
    pub fn fail_status(self, resource: &str, status: u16) -> Self {
        self.push(
            resource,
            Err(FetchError::Status {
                resource: resource.to_string(),
                status,
                body: String::new(),
            }
            .into()),
        );
        self
    }

    /// Queue a transport failure for `resource`.
    pub fn fail_transport(self, resource: &str) -> Self {
        self.push(
            resource,
            Err(FetchError::Transport {
                resource: resource.to_string(),
                reason: "connection reset".to_string(),
            }
            .into()),
        );
        self
    }

    fn push(&self, resource: &str, response: StrataResult<serde_json::Value>) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts
                .entry(resource.to_string())
                .or_default()
                .push_back(response);
        }
    }

    /// Number of fetches performed so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self, resource: &str) -> StrataResult<serde_json::Value> {
        let next = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.get_mut(resource).and_then(VecDeque::pop_front));

        let mut last = self.last.lock().map_err(|_| StorageError::LockPoisoned)?;
        match next {
            Some(response) => {
                last.insert(resource.to_string(), response.clone());
                response
            }
            None => last.get(resource).cloned().unwrap_or_else(|| {
                Err(FetchError::Status {
                    resource: resource.to_string(),
                    status: 404,
                    body: "not scripted".to_string(),
                }
                .into())
            }),
        }
    }
}

#[async_trait]
impl ResourceFetcher for ScriptedFetcher {
    async fn fetch(&self, resource: &str) -> StrataResult<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_response(resource)
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

/// A cache wired to an in-memory medium and a manual clock.
pub struct CacheFixture {
    pub cache: Arc<TieredCache>,
    pub medium: Arc<InMemoryMedium>,
    pub clock: ManualClock,
}

impl CacheFixture {
    /// Build a fixture from partial options.
    pub fn new(options: CacheOptions) -> Self {
        Self::with_medium(options, Arc::new(InMemoryMedium::new()))
    }

    /// Build a fixture over an existing medium, e.g. one seeded with foreign keys.
    pub fn with_medium(options: CacheOptions, medium: Arc<InMemoryMedium>) -> Self {
        let clock = ManualClock::starting_now();
        let cache = TieredCache::builder()
            .config(resolve(&options))
            .clock(Arc::new(clock.clone()))
            .medium(medium.clone())
            .build();
        Self {
            cache: Arc::new(cache),
            medium,
            clock,
        }
    }

    /// Memory tier bounded at `max_size`, persistent tier disabled.
    pub fn memory_only(max_size: usize) -> Self {
        Self::new(CacheOptions {
            max_size: Some(max_size),
            ..Default::default()
        })
    }

    /// Both tiers enabled.
    pub fn with_storage() -> Self {
        Self::new(CacheOptions {
            enable_storage: Some(true),
            ..Default::default()
        })
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use proptest::collection::{btree_set, vec};
    use proptest::prelude::*;
    use serde_json::{json, Value};

    /// User keys, including separators and URL-ish characters.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9_:/?=.-]{1,24}"
    }

    /// Namespaces never contain the separator.
    pub fn arb_namespace() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,11}"
    }

    pub fn arb_tag() -> impl Strategy<Value = String> {
        "[a-z]{1,8}"
    }

    pub fn arb_tags() -> impl Strategy<Value = Vec<String>> {
        btree_set(arb_tag(), 0..4).prop_map(|tags| tags.into_iter().collect())
    }

    /// JSON payloads of moderate depth. Integers only, so values survive a
    /// text round trip exactly.
    pub fn arb_payload() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[ -~]{0,16}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                vec(inner.clone(), 0..4).prop_map(Value::Array),
                vec(("[a-z]{1,6}", inner), 0..4)
                    .prop_map(|fields| Value::Object(fields.into_iter().collect())),
            ]
        })
    }

    /// Distinct user keys in random insertion order.
    pub fn arb_distinct_keys(
        count: std::ops::Range<usize>,
    ) -> impl Strategy<Value = Vec<String>> {
        btree_set("[a-z0-9]{1,10}", count)
            .prop_map(|keys| keys.into_iter().collect::<Vec<_>>())
            .prop_shuffle()
    }
}
