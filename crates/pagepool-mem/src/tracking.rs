//! Release counters and the diagnostics record of shared-pool evictions.
//!
//! Keep this cheap: counters are bumped from inside release actions, which
//! run on whatever thread performs the eviction.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

use pagepool_core::id::ContextId;

#[derive(Debug, Default)]
pub struct ReleaseCounters {
    pages: AtomicUsize,
    zone_reservations: AtomicUsize,
    large_pages: AtomicUsize,
}

impl ReleaseCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_page(&self) {
        self.pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_zone_reservation(&self) {
        self.zone_reservations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_large_page(&self) {
        self.large_pages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pages(&self) -> usize {
        self.pages.load(Ordering::Relaxed)
    }

    pub fn zone_reservations(&self) -> usize {
        self.zone_reservations.load(Ordering::Relaxed)
    }

    pub fn large_pages(&self) -> usize {
        self.large_pages.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of a pool. Each field is read under its own tier's
/// lock, so the snapshot as a whole is not atomic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub pooled_pages: usize,
    pub shared_pages: usize,
    pub pooled_zone_reservations: usize,
    pub pooled_large_pages: usize,
    pub large_pool_bytes: usize,
    pub large_pool_capacity_bytes: usize,
    pub pages_released: usize,
    pub zone_reservations_released: usize,
    pub large_pages_released: usize,
}

/// Outcome of one windowed eviction of the shared page and zone pools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseReport {
    pub pages_removed: usize,
    pub zone_reservations_removed: usize,
}

impl ReleaseReport {
    pub fn total(&self) -> usize {
        self.pages_removed + self.zone_reservations_removed
    }

    /// Best-effort log line; `trace` promotes it to info level.
    pub fn emit(&self, context: ContextId, trace: bool) {
        #[cfg(feature = "tracing")]
        {
            if trace {
                tracing::info!(
                    %context,
                    pages_removed = self.pages_removed,
                    zone_reservations_removed = self.zone_reservations_removed,
                    "Shared pool: removed pages and zone reservations"
                );
            } else {
                tracing::trace!(
                    %context,
                    pages_removed = self.pages_removed,
                    zone_reservations_removed = self.zone_reservations_removed,
                    "shared pool eviction"
                );
            }
        }
        #[cfg(not(feature = "tracing"))]
        {
            let _ = (context, trace);
        }
    }
}
