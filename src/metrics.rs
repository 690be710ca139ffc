// Sync metrics module
//
// Lightweight counters for the synchronization workflow, logged on shutdown

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Workflow counters.
///
/// Uses atomic operations so the controller and removal tasks can record
/// without locks.
#[derive(Debug)]
pub struct SyncMetrics {
    /// Fetches issued
    pub fetches: AtomicU64,

    /// Fetch responses discarded because a newer fetch was issued
    pub stale_fetches: AtomicU64,

    pub plugins_created: AtomicU64,

    pub plugins_removed: AtomicU64,

    /// Operations that failed for any reason, disconnects included
    pub failed_operations: AtomicU64,

    /// Times the MOD device was found unreachable
    pub disconnects: AtomicU64,

    /// Total time spent waiting on fetches, in milliseconds
    pub total_fetch_time_ms: AtomicU64,

    start_time: Instant,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            fetches: AtomicU64::new(0),
            stale_fetches: AtomicU64::new(0),
            plugins_created: AtomicU64::new(0),
            plugins_removed: AtomicU64::new(0),
            failed_operations: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
            total_fetch_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_fetch(&self, duration: Duration) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.total_fetch_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_stale_fetch(&self) {
        self.stale_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_created(&self, count: usize) {
        self.plugins_created.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_removed(&self, count: usize) {
        self.plugins_removed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average fetch round trip in milliseconds
    pub fn avg_fetch_time_ms(&self) -> f64 {
        let total = self.total_fetch_time_ms.load(Ordering::Relaxed);
        let count = self.fetches.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Sync Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Fetches: {} ({} stale discarded, avg {:.0}ms)",
            self.fetches.load(Ordering::Relaxed),
            self.stale_fetches.load(Ordering::Relaxed),
            self.avg_fetch_time_ms()
        );
        tracing::info!(
            "Plugins: {} created, {} removed",
            self.plugins_created.load(Ordering::Relaxed),
            self.plugins_removed.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Failures: {} operations, {} disconnects",
            self.failed_operations.load(Ordering::Relaxed),
            self.disconnects.load(Ordering::Relaxed)
        );
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}
