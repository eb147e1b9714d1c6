//! Request accounting for the rate-limited executor
//!
//! Counters are atomic so clones of an executor can share one set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Request statistics for a collection run
#[derive(Debug, Default)]
pub struct ExecutorMetrics {
    pub requests_sent: AtomicU64,
    pub rate_limit_waits: AtomicU64,
    pub transport_retries: AtomicU64,
    pub not_found: AtomicU64,
    pub slept_ms: AtomicU64,
}

impl ExecutorMetrics {
    /// Record that a request went out on the wire
    pub fn record_request(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rate-limit backoff and how long it slept
    pub fn record_rate_limit_wait(&self, wait: Duration) {
        self.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
        self.record_sleep(wait);
    }

    /// Record a transport retry and its delay
    pub fn record_transport_retry(&self, delay: Duration) {
        self.transport_retries.fetch_add(1, Ordering::Relaxed);
        self.record_sleep(delay);
    }

    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    fn record_sleep(&self, duration: Duration) {
        self.slept_ms.fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Get a snapshot of current metrics
    pub fn snapshot(&self) -> ExecutorMetricsSnapshot {
        ExecutorMetricsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            rate_limit_waits: self.rate_limit_waits.load(Ordering::Relaxed),
            transport_retries: self.transport_retries.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            slept: Duration::from_millis(self.slept_ms.load(Ordering::Relaxed)),
        }
    }
}

/// Immutable snapshot of executor metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorMetricsSnapshot {
    pub requests_sent: u64,
    pub rate_limit_waits: u64,
    pub transport_retries: u64,
    pub not_found: u64,
    pub slept: Duration,
}
