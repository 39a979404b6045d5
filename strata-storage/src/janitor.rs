//! Janitor Background Task
//!
//! Periodically removes expired entries from both tiers so dead entries do
//! not linger in `stats()` or in the persistent medium until someone happens
//! to read them. Lazy expiry on `get` still applies in between sweeps.
//!
//! # Usage
//!
//! ```ignore
//! use strata_storage::janitor::spawn_janitor;
//!
//! let cache = Arc::new(TieredCache::new(config));
//! let janitor = spawn_janitor(Arc::clone(&cache));
//!
//! // On teardown: one last sweep, then the task exits.
//! let metrics = janitor.shutdown().await;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use strata_core::MAX_CLEANUP_INTERVAL;

use crate::tiered::TieredCache;

/// Shortest period the janitor will tick at.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Entries removed by one sweep, per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub memory: usize,
    pub storage: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.memory + self.storage
    }
}

/// Counters accumulated by a running janitor.
#[derive(Debug, Default)]
pub struct JanitorMetrics {
    pub sweeps: AtomicU64,
    pub memory_removed: AtomicU64,
    pub storage_removed: AtomicU64,
}

/// Point-in-time copy of [`JanitorMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JanitorMetricsSnapshot {
    pub sweeps: u64,
    pub memory_removed: u64,
    pub storage_removed: u64,
}

impl JanitorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, report: SweepReport) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.memory_removed
            .fetch_add(report.memory as u64, Ordering::Relaxed);
        self.storage_removed
            .fetch_add(report.storage as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> JanitorMetricsSnapshot {
        JanitorMetricsSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            memory_removed: self.memory_removed.load(Ordering::Relaxed),
            storage_removed: self.storage_removed.load(Ordering::Relaxed),
        }
    }
}

/// Run one sweep and record it.
fn sweep(cache: &TieredCache, metrics: &JanitorMetrics) -> SweepReport {
    let report = cache.sweep_once();
    metrics.record(report);

    if report.total() > 0 {
        tracing::info!(
            memory = report.memory,
            storage = report.storage,
            "Cache sweep removed expired entries"
        );
    } else {
        tracing::trace!("Cache sweep found nothing expired");
    }
    report
}

/// Sweep `cache` every `period` until `shutdown_rx` turns true or its sender
/// is dropped, then sweep once more and return the accumulated metrics.
///
/// `period` is clamped to `1ms..=MAX_CLEANUP_INTERVAL`.
pub async fn janitor_task(
    cache: Arc<TieredCache>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<JanitorMetrics> {
    let metrics = Arc::new(JanitorMetrics::new());

    let clamped = period.clamp(MIN_PERIOD, MAX_CLEANUP_INTERVAL);
    if clamped != period {
        tracing::warn!(
            requested_ms = period.as_millis() as u64,
            period_ms = clamped.as_millis() as u64,
            "Janitor period out of range, clamped"
        );
    }
    let period = clamped;

    // First tick one period from now; an immediate sweep of a fresh cache
    // would be pointless.
    let now = Instant::now();
    let start = now.checked_add(period).unwrap_or(now);
    let mut ticker = interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(period_ms = period.as_millis() as u64, "Cache janitor started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                sweep(&cache, &metrics);
            }
        }
    }

    // Teardown flush.
    sweep(&cache, &metrics);

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps = snapshot.sweeps,
        memory_removed = snapshot.memory_removed,
        storage_removed = snapshot.storage_removed,
        "Cache janitor stopped"
    );

    metrics
}

/// Handle to a spawned janitor.
#[derive(Debug)]
pub struct JanitorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<Arc<JanitorMetrics>>,
}

impl JanitorHandle {
    /// Stop the janitor after its final sweep and return its metrics.
    pub async fn shutdown(self) -> Option<JanitorMetricsSnapshot> {
        let _ = self.shutdown_tx.send(true);
        match self.task.await {
            Ok(metrics) => Some(metrics.snapshot()),
            Err(e) => {
                tracing::error!(error = %e, "Cache janitor task failed");
                None
            }
        }
    }
}

/// Spawn a janitor on the current tokio runtime using the cache's
/// configured cleanup interval.
pub fn spawn_janitor(cache: Arc<TieredCache>) -> JanitorHandle {
    let period = cache.config().cleanup_interval;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(janitor_task(cache, period, shutdown_rx));
    JanitorHandle { shutdown_tx, task }
}
