//! Ranking metrics and performance monitoring
//!
//! Counters and gauges go through the `metrics` facade; with no recorder
//! installed they are no-ops. Build with the `prometheus` feature to export
//! them.

use std::time::{Duration, Instant};

pub const INTERACTIONS_TOTAL: &str = "socialrank_interactions_total";
pub const FEED_REQUESTS_TOTAL: &str = "socialrank_feed_requests_total";
pub const SWEEP_REMOVED_TOTAL: &str = "socialrank_sweep_removed_total";
pub const RECOMPUTE_FAILURES_TOTAL: &str = "socialrank_recompute_failures_total";
pub const TRACKED_USERS: &str = "socialrank_tracked_users";
pub const TRACKED_CONTENT: &str = "socialrank_tracked_content";

pub fn record_interaction(kind: &'static str) {
    ::metrics::counter!(INTERACTIONS_TOTAL, "kind" => kind).increment(1);
}

pub fn record_feed_request(feed: &'static str) {
    ::metrics::counter!(FEED_REQUESTS_TOTAL, "feed" => feed).increment(1);
}

pub fn record_sweep(removed: usize, failures: usize, users: usize, content: usize) {
    ::metrics::counter!(SWEEP_REMOVED_TOTAL).increment(removed as u64);
    ::metrics::counter!(RECOMPUTE_FAILURES_TOTAL).increment(failures as u64);
    ::metrics::gauge!(TRACKED_USERS).set(users as f64);
    ::metrics::gauge!(TRACKED_CONTENT).set(content as f64);
}

/// Performance timer for tracking operation duration
pub struct PerformanceTimer {
    start: Instant,
    label: &'static str,
}

impl PerformanceTimer {
    pub fn new(label: &'static str) -> Self {
        Self {
            start: Instant::now(),
            label,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }

    /// Returns true if the threshold was exceeded
    pub fn log_if_slow(&self, threshold: Duration) -> bool {
        let elapsed = self.elapsed();
        if elapsed > threshold {
            tracing::warn!(
                "Slow operation: {} took {}ms (threshold: {}ms)",
                self.label,
                elapsed.as_millis(),
                threshold.as_millis()
            );
            return true;
        }
        false
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        tracing::debug!("{} completed in {}ms", self.label, self.elapsed_ms());
    }
}
