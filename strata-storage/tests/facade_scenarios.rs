//! End-to-end scenarios for the cache facade: cache-aside fetching,
//! invalidation, prefix isolation and persistence across instances.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use strata_storage::{LmdbMedium, MarketDataCache, PanelConfigCache};
use strata_test_utils::{
    CacheFixture, CacheOptions, FetchError, FetchOptions, InMemoryMedium, KvMedium,
    ScriptedFetcher, SetOptions, StrataError, TieredCache,
};
use tempfile::TempDir;

#[tokio::test]
async fn test_fetch_with_cache_calls_fetcher_once() {
    let fixture = CacheFixture::new(CacheOptions::default());
    let fetcher = ScriptedFetcher::new().respond("/api/v5/market/ticker", json!({"last": "65000"}));
    let opts = FetchOptions::new().max_age(Duration::from_secs(60));

    let first: Value = fixture
        .cache
        .fetch_with_cache(&fetcher, "/api/v5/market/ticker", &opts)
        .await
        .expect("first fetch should succeed");
    let second: Value = fixture
        .cache
        .fetch_with_cache(&fetcher, "/api/v5/market/ticker", &opts)
        .await
        .expect("second fetch should succeed");

    assert_eq!(first, second);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(
        fixture.cache.get::<Value>("/api/v5/market/ticker", "api"),
        Some(json!({"last": "65000"}))
    );
}

#[tokio::test]
async fn test_force_refresh_overwrites_cached_value() {
    let fixture = CacheFixture::new(CacheOptions::default());
    let fetcher = ScriptedFetcher::new()
        .respond("/balance", json!({"total": 1}))
        .respond("/balance", json!({"total": 2}));

    let opts = FetchOptions::new().cache_key("balance");
    let first: Value = fixture
        .cache
        .fetch_with_cache(&fetcher, "/balance", &opts)
        .await
        .expect("fetch should succeed");
    assert_eq!(first, json!({"total": 1}));

    let refreshed: Value = fixture
        .cache
        .fetch_with_cache(&fetcher, "/balance", &opts.clone().force_refresh(true))
        .await
        .expect("refresh should succeed");
    assert_eq!(refreshed, json!({"total": 2}));
    assert_eq!(fetcher.calls(), 2);

    // The refreshed value is what later readers see.
    assert_eq!(
        fixture.cache.get::<Value>("balance", "api"),
        Some(json!({"total": 2}))
    );
}

#[tokio::test]
async fn test_fetch_errors_are_not_cached() {
    let fixture = CacheFixture::new(CacheOptions::default());
    let fetcher = ScriptedFetcher::new()
        .fail_status("/orders", 503)
        .respond("/orders", json!([]));
    let opts = FetchOptions::new();

    let err = fixture
        .cache
        .fetch_with_cache::<Value, _>(&fetcher, "/orders", &opts)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StrataError::Fetch(FetchError::Status { status: 503, .. })
    ));
    assert!(!fixture.cache.has("/orders", "api"));

    let orders: Value = fixture
        .cache
        .fetch_with_cache(&fetcher, "/orders", &opts)
        .await
        .expect("retry should succeed");
    assert_eq!(orders, json!([]));
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn test_transport_error_propagates() {
    let fixture = CacheFixture::new(CacheOptions::default());
    let fetcher = ScriptedFetcher::new().fail_transport("/ticker");

    let err = fixture
        .cache
        .fetch_with_cache::<Value, _>(&fetcher, "/ticker", &FetchOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StrataError::Fetch(FetchError::Transport { .. })));
    assert_eq!(fixture.cache.stats().memory.entries, 0);
}

#[tokio::test]
async fn test_expired_fetch_result_is_refetched() {
    let fixture = CacheFixture::new(CacheOptions::default());
    let fetcher = ScriptedFetcher::new()
        .respond("/funding", json!({"rate": "0.0001"}))
        .respond("/funding", json!({"rate": "0.0002"}));
    let opts = FetchOptions::new().max_age(Duration::from_secs(30));

    let _: Value = fixture
        .cache
        .fetch_with_cache(&fetcher, "/funding", &opts)
        .await
        .expect("fetch should succeed");

    fixture.advance(Duration::from_secs(31));
    let later: Value = fixture
        .cache
        .fetch_with_cache(&fetcher, "/funding", &opts)
        .await
        .expect("refetch should succeed");

    assert_eq!(later, json!({"rate": "0.0002"}));
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_share_one_fetch() {
    let fixture = CacheFixture::new(CacheOptions::default());
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .with_delay(Duration::from_millis(50))
            .respond("/instruments", json!(["BTC-USDT", "ETH-USDT"])),
    );

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&fixture.cache);
        let fetcher = Arc::clone(&fetcher);
        tasks.push(tokio::spawn(async move {
            cache
                .fetch_with_cache::<Value, _>(fetcher.as_ref(), "/instruments", &FetchOptions::new())
                .await
        }));
    }

    for task in tasks {
        let value = task
            .await
            .expect("task should join")
            .expect("fetch should succeed");
        assert_eq!(value, json!(["BTC-USDT", "ETH-USDT"]));
    }
    assert_eq!(fetcher.calls(), 1);

    // Exactly one caller missed; everyone else was served from the cache.
    let stats = fixture.cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 7);
}

#[tokio::test]
async fn test_different_keys_fetch_independently() {
    let fixture = CacheFixture::new(CacheOptions::default());
    let fetcher = ScriptedFetcher::new()
        .with_delay(Duration::from_millis(5))
        .respond("/a", json!(1))
        .respond("/b", json!(2));
    let opts = FetchOptions::new();

    let (a, b) = tokio::join!(
        fixture.cache.fetch_with_cache::<Value, _>(&fetcher, "/a", &opts),
        fixture.cache.fetch_with_cache::<Value, _>(&fetcher, "/b", &opts),
    );

    assert_eq!(a.expect("a should succeed"), json!(1));
    assert_eq!(b.expect("b should succeed"), json!(2));
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn test_tag_invalidation_scenario() {
    let fixture = CacheFixture::with_storage();
    fixture.cache.set("A", &"a", &SetOptions::new().tag("x"));
    fixture.cache.set("B", &"b", &SetOptions::new().tags(["x", "y"]));
    fixture.cache.set("C", &"c", &SetOptions::new().tag("y"));

    fixture.cache.delete_by_tag("x");

    assert!(!fixture.cache.has("A", "default"));
    assert!(!fixture.cache.has("B", "default"));
    assert_eq!(fixture.cache.get::<String>("C", "default"), Some("c".to_string()));
    assert_eq!(fixture.cache.stats().storage.entries, 1);
}

#[test]
fn test_clear_leaves_foreign_keys_alone() {
    let medium = Arc::new(InMemoryMedium::new());
    medium
        .set_item("theme", "dark")
        .expect("seeding should succeed");

    let fixture = CacheFixture::with_medium(
        CacheOptions {
            enable_storage: Some(true),
            ..Default::default()
        },
        medium,
    );
    fixture.cache.set("layout", &json!({"cols": 3}), &SetOptions::new());
    fixture.cache.set("watchlist", &json!(["BTC"]), &SetOptions::new());

    fixture.cache.clear();

    let keys = fixture.medium.keys().expect("keys should list");
    assert_eq!(keys, vec!["theme".to_string()]);
    assert_eq!(
        fixture.medium.get_item("theme").expect("read should succeed"),
        Some("dark".to_string())
    );
    assert_eq!(fixture.cache.stats().memory.entries, 0);
}

#[test]
fn test_market_quote_scenario() {
    let fixture = CacheFixture::new(CacheOptions::default());
    let market = MarketDataCache::new(&fixture.cache);

    market.put("BTC", &json!({"last": "65000", "vol24h": "1200"}));
    assert_eq!(
        fixture.cache.get::<Value>("market_BTC", "trading"),
        Some(json!({"last": "65000", "vol24h": "1200"}))
    );

    fixture.advance(Duration::from_secs(29));
    assert!(market.get::<Value>("BTC").is_some());

    fixture.advance(Duration::from_secs(2));
    assert!(market.get::<Value>("BTC").is_none());
}

#[test]
fn test_hit_rate_counts_reads() {
    let fixture = CacheFixture::new(CacheOptions::default());
    fixture.cache.set("k", &1, &SetOptions::new());

    let _ = fixture.cache.get::<i32>("k", "default");
    let _ = fixture.cache.get::<i32>("k", "default");
    let _ = fixture.cache.get::<i32>("missing", "default");

    let stats = fixture.cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
    assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
}

#[test]
fn test_panel_config_survives_restart_on_lmdb() {
    let dir = TempDir::new().expect("temp dir should be created");

    {
        let medium = Arc::new(LmdbMedium::open(dir.path(), 16).expect("lmdb should open"));
        let cache = TieredCache::builder().medium(medium).build();
        PanelConfigCache::new(&cache).put("chart-1", &json!({"interval": "4h"}));
    }

    let medium = Arc::new(LmdbMedium::open(dir.path(), 16).expect("lmdb should reopen"));
    let cache = TieredCache::builder()
        .config(strata_test_utils::resolve(&CacheOptions {
            enable_storage: Some(true),
            ..Default::default()
        }))
        .medium(medium)
        .build();

    assert_eq!(
        PanelConfigCache::new(&cache).get::<Value>("chart-1"),
        Some(json!({"interval": "4h"}))
    );
}
