use std::time::Duration;
use tokio::time::{self, Instant};

/// Spaces out admissions into a batch at `1 / rate_limit` seconds apart.
///
/// Admissions are scheduled against a running deadline rather than a fresh
/// sleep each, so timer granularity shows up as jitter instead of lowering
/// the achieved rate. Only admission is paced: once a batch is full its
/// requests still run concurrently.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPacer {
    interval: Duration,
    next: Option<Instant>,
}

impl AdmissionPacer {
    pub fn new(rate_limit: u32) -> Self {
        Self {
            interval: Duration::from_secs(1) / rate_limit.max(1),
            next: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts a new schedule at the current instant. Time spent outside
    /// admission (firing a batch) is not credited to the next batch.
    pub fn reset(&mut self) {
        self.next = None;
    }

    pub async fn admit(&mut self) {
        let deadline = self.next.unwrap_or_else(Instant::now) + self.interval;
        self.next = Some(deadline);
        time::sleep_until(deadline).await;
    }
}
