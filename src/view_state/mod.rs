// view_state - screen-state engines for the countries list and detail screens

mod debounce;
mod detail;
mod list;
mod state;
mod task;

use std::sync::atomic::{AtomicU64, Ordering};

pub use debounce::Debouncer;
pub use detail::CountryDetailsEngine;
pub use list::{filter_items, CountriesListEngine};
pub use state::StateHolder;
pub use task::TaskSlot;

// ============================================================================
// Metrics and Observability
// ============================================================================

#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Observation subscriptions opened against the repository.
    pub subscriptions: AtomicU64,
    /// Filter recomputations that produced a list.
    pub filter_passes: AtomicU64,
    pub refreshes: AtomicU64,
    pub refresh_failures: AtomicU64,
    /// Observation streams that ended with an error.
    pub stream_errors: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            subscriptions: self.subscriptions.load(Ordering::Relaxed),
            filter_passes: self.filter_passes.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub subscriptions: u64,
    pub filter_passes: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
    pub stream_errors: u64,
}
