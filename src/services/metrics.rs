//! Counters for the monitor loop

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Completed monitoring passes
    pub passes: u64,
    /// Successful price lookups
    pub prices_fetched: u64,
    /// Lookups that exhausted their retries
    pub price_failures: u64,
    /// Exit outcomes
    pub exits_closed: u64,
    pub exits_failed: u64,
    /// Ledger writes that did not land on the first try
    pub ledger_write_failures: u64,
}

/// Thread-safe metrics collector
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    passes: AtomicU64,
    prices_fetched: AtomicU64,
    price_failures: AtomicU64,
    exits_closed: AtomicU64,
    exits_failed: AtomicU64,
    ledger_write_failures: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_passes(&self) {
        self.inner.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_prices_fetched(&self) {
        self.inner.prices_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_price_failures(&self) {
        self.inner.price_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_exits_closed(&self) {
        self.inner.exits_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_exits_failed(&self) {
        self.inner.exits_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ledger_write_failures(&self) {
        self.inner.ledger_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            passes: self.inner.passes.load(Ordering::Relaxed),
            prices_fetched: self.inner.prices_fetched.load(Ordering::Relaxed),
            price_failures: self.inner.price_failures.load(Ordering::Relaxed),
            exits_closed: self.inner.exits_closed.load(Ordering::Relaxed),
            exits_failed: self.inner.exits_failed.load(Ordering::Relaxed),
            ledger_write_failures: self.inner.ledger_write_failures.load(Ordering::Relaxed),
        }
    }
}
