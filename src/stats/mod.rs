use crate::striker::Outcome;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Counters {
    success: AtomicU64,
    failure: AtomicU64,
}

impl Counters {
    pub fn record(&self, success: bool) {
        if success {
            self.success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failure.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn success(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub fn failure(&self) -> u64 {
        self.failure.load(Ordering::Relaxed)
    }
}

/// Running count, sum and maximum of request latencies.
///
/// Keeps no individual samples, so memory stays flat on unbounded runs while
/// mean and max come out the same as over the full sample list.
#[derive(Debug, Default)]
pub struct LatencyStats {
    count: AtomicU64,
    total_micros: AtomicU64,
    max_micros: AtomicU64,
}

impl LatencyStats {
    pub fn record(&self, latency: Duration) {
        let micros = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        self.total_micros.fetch_add(micros, Ordering::Relaxed);
        self.max_micros.fetch_max(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn average_ms(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        self.total_micros.load(Ordering::Relaxed) as f64 / count as f64 / 1000.0
    }

    pub fn max_ms(&self) -> f64 {
        self.max_micros.load(Ordering::Relaxed) as f64 / 1000.0
    }
}

/// State mutated concurrently by every worker of a run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub counters: Counters,
    pub latencies: LatencyStats,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &Outcome) {
        if let Some(latency) = outcome.latency {
            self.latencies.record(latency);
        }
        self.counters.record(outcome.success);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    /// Requests per second over the whole run.
    pub rate: f64,
    pub avg_latency_ms: f64,
    pub max_latency_ms: f64,
    pub elapsed_secs: f64,
}

pub struct StatsAggregator;

impl StatsAggregator {
    pub fn snapshot(stats: &RunStats, elapsed: Duration) -> StatsSnapshot {
        let success = stats.counters.success();
        let failure = stats.counters.failure();
        let total = success + failure;
        let elapsed_secs = elapsed.as_secs_f64();
        let rate = if elapsed_secs > 0.0 {
            total as f64 / elapsed_secs
        } else {
            0.0
        };

        StatsSnapshot {
            total,
            success,
            failure,
            rate,
            avg_latency_ms: stats.latencies.average_ms(),
            max_latency_ms: stats.latencies.max_ms(),
            elapsed_secs,
        }
    }
}
