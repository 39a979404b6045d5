//! Named wrappers fixing namespace, lifetime and tags for common dashboard
//! data. They add no behavior of their own.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::tiered::{SetOptions, TieredCache};

pub const MARKET_NAMESPACE: &str = "trading";
pub const MARKET_TAG: &str = "market";
pub const MARKET_TTL: Duration = Duration::from_secs(30);

pub const PANEL_NAMESPACE: &str = "panels";
pub const PANEL_TAG: &str = "config";
pub const PANEL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub const POSITION_NAMESPACE: &str = "positions";
pub const POSITION_TAG: &str = "positions";
pub const POSITION_TTL: Duration = Duration::from_secs(10);

/// Short-lived market quotes keyed by symbol.
#[derive(Debug, Clone, Copy)]
pub struct MarketDataCache<'a> {
    cache: &'a TieredCache,
}

impl<'a> MarketDataCache<'a> {
    pub fn new(cache: &'a TieredCache) -> Self {
        Self { cache }
    }

    fn key(symbol: &str) -> String {
        format!("market_{symbol}")
    }

    pub fn put<T: Serialize>(&self, symbol: &str, quote: &T) -> bool {
        let opts = SetOptions::new()
            .namespace(MARKET_NAMESPACE)
            .max_age(MARKET_TTL)
            .tag(MARKET_TAG);
        self.cache.set(&Self::key(symbol), quote, &opts)
    }

    pub fn get<T: DeserializeOwned>(&self, symbol: &str) -> Option<T> {
        self.cache.get(&Self::key(symbol), MARKET_NAMESPACE)
    }

    /// Drop every cached quote.
    pub fn invalidate_all(&self) -> usize {
        self.cache.delete_by_tag(MARKET_TAG)
    }
}

/// Panel layout and indicator settings. Always written to the persistent
/// tier so they outlive a reload.
#[derive(Debug, Clone, Copy)]
pub struct PanelConfigCache<'a> {
    cache: &'a TieredCache,
}

impl<'a> PanelConfigCache<'a> {
    pub fn new(cache: &'a TieredCache) -> Self {
        Self { cache }
    }

    pub fn put<T: Serialize>(&self, panel_id: &str, config: &T) -> bool {
        let opts = SetOptions::new()
            .namespace(PANEL_NAMESPACE)
            .max_age(PANEL_TTL)
            .tag(PANEL_TAG)
            .force_storage(true);
        self.cache.set(panel_id, config, &opts)
    }

    pub fn get<T: DeserializeOwned>(&self, panel_id: &str) -> Option<T> {
        self.cache.get(panel_id, PANEL_NAMESPACE)
    }

    pub fn invalidate(&self, panel_id: &str) {
        self.cache.delete(panel_id, PANEL_NAMESPACE);
    }
}

/// Open positions per account, tagged by account so one account can be
/// invalidated after an order fills.
#[derive(Debug, Clone, Copy)]
pub struct PositionCache<'a> {
    cache: &'a TieredCache,
}

impl<'a> PositionCache<'a> {
    pub fn new(cache: &'a TieredCache) -> Self {
        Self { cache }
    }

    fn account_tag(account: &str) -> String {
        format!("account:{account}")
    }

    pub fn put<T: Serialize>(&self, account: &str, positions: &T) -> bool {
        let opts = SetOptions::new()
            .namespace(POSITION_NAMESPACE)
            .max_age(POSITION_TTL)
            .tags([POSITION_TAG.to_string(), Self::account_tag(account)]);
        self.cache.set(account, positions, &opts)
    }

    pub fn get<T: DeserializeOwned>(&self, account: &str) -> Option<T> {
        self.cache.get(account, POSITION_NAMESPACE)
    }

    pub fn invalidate_account(&self, account: &str) -> usize {
        self.cache.delete_by_tag(&Self::account_tag(account))
    }
}
