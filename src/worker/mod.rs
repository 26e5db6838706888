mod pacer;

pub use pacer::AdmissionPacer;

use crate::engine::RunStateCell;
use crate::request::{RequestDescriptor, RequestGenerator};
use crate::stats::RunStats;
use crate::striker::Striker;
use futures::future::join_all;
use std::sync::Arc;
use tracing::debug;

/// One unit of concurrency: admit a batch, fire it, fold results, repeat.
pub struct Worker {
    id: usize,
    sockets: usize,
    pacer: AdmissionPacer,
    generator: Arc<RequestGenerator>,
    striker: Arc<Striker>,
    stats: Arc<RunStats>,
    state: Arc<RunStateCell>,
}

impl Worker {
    pub fn new(
        id: usize,
        sockets: usize,
        pacer: AdmissionPacer,
        generator: Arc<RequestGenerator>,
        striker: Arc<Striker>,
        stats: Arc<RunStats>,
        state: Arc<RunStateCell>,
    ) -> Self {
        Self {
            id,
            sockets,
            pacer,
            generator,
            striker,
            stats,
            state,
        }
    }

    /// Runs batches until the run leaves `Active`. Returns the number of batches fired.
    ///
    /// The state is only checked between batches; a batch that has started
    /// admitting always completes.
    pub async fn run(mut self) -> u64 {
        let mut batches = 0;

        while self.state.is_active() {
            let batch = self.admit_batch().await;
            self.fire(batch).await;
            batches += 1;
        }

        debug!("Worker {} exiting after {} batches", self.id, batches);
        batches
    }

    async fn admit_batch(&mut self) -> Vec<RequestDescriptor> {
        let mut batch = Vec::with_capacity(self.sockets);
        self.pacer.reset();
        for _ in 0..self.sockets {
            let descriptor = self.generator.generate();
            self.pacer.admit().await;
            batch.push(descriptor);
        }
        batch
    }

    async fn fire(&self, batch: Vec<RequestDescriptor>) {
        let strikes = batch
            .into_iter()
            .map(|descriptor| self.striker.strike(descriptor));

        for outcome in join_all(strikes).await {
            self.stats.record(&outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RunConfig, Target};
    use crate::stats::StatsAggregator;
    use std::time::Duration;
    use tokio::time::Instant;

    fn worker(sockets: usize, rate_limit: u32, stats: Arc<RunStats>, state: Arc<RunStateCell>) -> Worker {
        let config = RunConfig::new(Target::parse("http://127.0.0.1:9/").unwrap());
        Worker::new(
            1,
            sockets,
            AdmissionPacer::new(rate_limit),
            Arc::new(RequestGenerator::new(&config)),
            Arc::new(Striker::dry_run()),
            stats,
            state,
        )
    }

    #[tokio::test]
    async fn inactive_run_fires_nothing() {
        let stats = Arc::new(RunStats::new());
        let state = Arc::new(RunStateCell::new());

        let batches = worker(4, 1000, stats.clone(), state).run().await;

        assert_eq!(batches, 0);
        assert_eq!(stats.counters.success(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn finishes_started_batch_after_stop() {
        let stats = Arc::new(RunStats::new());
        let state = Arc::new(RunStateCell::new());
        state.activate();

        let sockets = 10;
        let handle = tokio::spawn(worker(sockets, 10, stats.clone(), state.clone()).run());

        // stop in the middle of the first batch's admission
        tokio::time::sleep(Duration::from_millis(450)).await;
        state.request_stop();

        let batches = handle.await.unwrap();
        assert_eq!(batches, 1);
        assert_eq!(stats.counters.success(), sockets as u64);
        assert_eq!(stats.counters.failure(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_admission_is_paced() {
        let stats = Arc::new(RunStats::new());
        let state = Arc::new(RunStateCell::new());
        state.activate();

        let sockets = 20;
        let rate_limit = 100;
        let start = Instant::now();
        let handle = tokio::spawn(worker(sockets, rate_limit, stats.clone(), state.clone()).run());

        // let exactly three batches complete
        tokio::time::sleep(Duration::from_millis(3 * 200 - 10)).await;
        state.request_stop();
        let batches = handle.await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(batches, 3);
        let admissions = batches as u32 * sockets as u32;
        let floor = Duration::from_secs(1) / rate_limit;
        assert!(elapsed / admissions >= floor.mul_f64(0.95));

        let snapshot = StatsAggregator::snapshot(&stats, elapsed);
        assert_eq!(snapshot.total, u64::from(admissions));
    }

    #[tokio::test]
    async fn default_rate_batch_admits_at_full_speed() {
        let stats = Arc::new(RunStats::new());
        let state = Arc::new(RunStateCell::new());
        state.activate();

        let sockets = 350;
        let start = Instant::now();
        let handle = tokio::spawn(worker(sockets, 10_000, stats.clone(), state.clone()).run());
        tokio::time::sleep(Duration::from_millis(5)).await;
        state.request_stop();

        let batches = handle.await.unwrap();
        let elapsed = start.elapsed();

        // 350 admissions at 10000/s is 35ms of pacing
        assert_eq!(batches, 1);
        assert_eq!(stats.counters.success(), sockets as u64);
        assert!(elapsed < Duration::from_millis(200), "batch took {elapsed:?}");
    }
}
