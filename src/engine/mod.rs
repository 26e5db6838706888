mod state;

pub use state::{RunState, RunStateCell};

use crate::config::RunConfig;
use crate::connection_pool::{ConnectionPool, SetupError, SharedConnectionPool};
use crate::request::RequestGenerator;
use crate::stats::{RunStats, StatsAggregator, StatsSnapshot};
use crate::striker::Striker;
use crate::worker::{AdmissionPacer, Worker};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// How long a dry run lingers before stopping.
pub const DRY_RUN_PAUSE: Duration = Duration::from_secs(1);

/// Stops a run from outside the engine, e.g. on Ctrl-C.
#[derive(Debug, Clone)]
pub struct StopHandle {
    state: Arc<RunStateCell>,
}

impl StopHandle {
    /// Soft stop: workers finish their current batch and exit.
    pub fn stop(&self) -> bool {
        let stopped = self.state.request_stop();
        if stopped {
            info!("Stop requested, waiting for in-flight batches");
        }
        stopped
    }
}

/// Read-only view of a run's statistics while it is in progress.
#[derive(Debug, Clone)]
pub struct StatsMonitor {
    stats: Arc<RunStats>,
    started_at: Arc<OnceLock<Instant>>,
    state: Arc<RunStateCell>,
}

impl StatsMonitor {
    pub fn snapshot(&self) -> StatsSnapshot {
        let elapsed = self
            .started_at
            .get()
            .map(Instant::elapsed)
            .unwrap_or_default();
        StatsAggregator::snapshot(&self.stats, elapsed)
    }

    pub fn state(&self) -> RunState {
        self.state.get()
    }
}

/// Owns everything a run shares: connection pool, counters, and run state.
pub struct Engine {
    config: Arc<RunConfig>,
    state: Arc<RunStateCell>,
    stats: Arc<RunStats>,
    started_at: Arc<OnceLock<Instant>>,
}

impl Engine {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config: Arc::new(config),
            state: Arc::new(RunStateCell::new()),
            stats: Arc::new(RunStats::new()),
            started_at: Arc::new(OnceLock::new()),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            state: self.state.clone(),
        }
    }

    pub fn monitor(&self) -> StatsMonitor {
        StatsMonitor {
            stats: self.stats.clone(),
            started_at: self.started_at.clone(),
            state: self.state.clone(),
        }
    }

    /// Drives the run to completion and returns the final statistics.
    ///
    /// Only setup can fail; request faults end up in the failure count.
    pub async fn run(self) -> Result<StatsSnapshot, SetupError> {
        let pool = if self.config.dry_run {
            None
        } else {
            let pool = Arc::new(ConnectionPool::new(&self.config)?);
            info!("Session initialised for {}", self.config.target.base_url());
            Some(pool)
        };

        let started_at = *self.started_at.get_or_init(Instant::now);
        let progress = self.spawn_progress_reporter();

        if !self.state.activate() {
            info!("Run stopped before it started");
        } else if let Some(pool) = &pool {
            let workers = self.spawn_workers(pool.clone());
            self.wait_for_stop().await;
            self.join_workers(workers).await;
        } else {
            self.rehearse().await;
        }

        self.state.request_stop();
        if let Some(pool) = pool {
            pool.close();
        }
        if let Some(progress) = progress {
            progress.abort();
        }
        let closed = self.state.close();
        debug_assert!(closed, "run closed twice");

        let snapshot = StatsAggregator::snapshot(&self.stats, started_at.elapsed());
        info!(
            "Run finished: {} requests in {:.2}s",
            snapshot.total, snapshot.elapsed_secs
        );
        Ok(snapshot)
    }

    /// Dry run: one descriptor goes through generation and a network-free strike.
    async fn rehearse(&self) {
        info!("Dry run enabled, no requests will be sent");
        let generator = RequestGenerator::new(&self.config);
        let outcome = Striker::dry_run().strike(generator.generate()).await;
        self.stats.record(&outcome);
        if time::timeout(DRY_RUN_PAUSE, self.state.stopped()).await.is_ok() {
            info!("Dry run interrupted");
        }
    }

    fn spawn_workers(&self, pool: SharedConnectionPool) -> Vec<JoinHandle<u64>> {
        let generator = Arc::new(RequestGenerator::new(&self.config));
        let striker = Arc::new(Striker::live(
            pool,
            self.config.target.clone(),
            self.config.request_timeout,
        ));
        let pacer = AdmissionPacer::new(self.config.rate_limit);

        (1..=self.config.workers)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    self.config.sockets,
                    pacer,
                    generator.clone(),
                    striker.clone(),
                    self.stats.clone(),
                    self.state.clone(),
                );
                tokio::spawn(worker.run())
            })
            .collect()
    }

    async fn wait_for_stop(&self) {
        match self.config.duration {
            Some(duration) => {
                info!("Starting load test for {} seconds", duration.as_secs_f64());
                if time::timeout(duration, self.state.stopped()).await.is_err() {
                    info!("Duration elapsed, stopping");
                }
            }
            None => {
                info!("Starting load test until interrupted");
                self.state.stopped().await;
            }
        }
        self.state.request_stop();
    }

    async fn join_workers(&self, workers: Vec<JoinHandle<u64>>) {
        let mut batches = 0;
        for worker in workers {
            match worker.await {
                Ok(n) => batches += n,
                Err(e) => warn!("Worker task failed: {}", e),
            }
        }
        debug!("All workers stopped after {} batches", batches);
    }

    fn spawn_progress_reporter(&self) -> Option<JoinHandle<()>> {
        let period = self.config.progress_interval?;
        let monitor = self.monitor();

        Some(tokio::spawn(async move {
            let mut interval = time::interval(period);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                if monitor.state() != RunState::Active {
                    break;
                }
                let s = monitor.snapshot();
                info!(
                    "{} requests ({} ok, {} failed), {:.2} req/s, avg {:.2} ms, max {:.2} ms",
                    s.total, s.success, s.failure, s.rate, s.avg_latency_ms, s.max_latency_ms
                );
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;

    fn dry_config() -> RunConfig {
        let mut config = RunConfig::new(Target::parse("http://127.0.0.1:9/").unwrap());
        config.dry_run = true;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_strikes_once_and_pauses() {
        let mut config = dry_config();
        config.workers = 500;
        config.sockets = 1000;
        let engine = Engine::new(config);
        let monitor = engine.monitor();

        let snapshot = engine.run().await.unwrap();

        assert_eq!(snapshot.success, 1);
        assert_eq!(snapshot.failure, 0);
        assert_eq!(snapshot.avg_latency_ms, 0.0);
        assert!(snapshot.elapsed_secs >= DRY_RUN_PAUSE.as_secs_f64());
        assert!(snapshot.elapsed_secs < DRY_RUN_PAUSE.as_secs_f64() + 0.5);
        assert_eq!(monitor.state(), RunState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_pause_honours_stop() {
        let engine = Engine::new(dry_config());
        let stop = engine.stop_handle();
        let started = Instant::now();

        let run = tokio::spawn(engine.run());
        time::sleep(Duration::from_millis(100)).await;
        assert!(stop.stop());

        let snapshot = run.await.unwrap().unwrap();
        assert_eq!(snapshot.success, 1);
        assert!(started.elapsed() < DRY_RUN_PAUSE);
    }

    #[tokio::test]
    async fn stop_before_run_closes_immediately() {
        let engine = Engine::new(dry_config());
        let handle = engine.stop_handle();
        assert!(handle.stop());
        assert!(!handle.stop());

        let monitor = engine.monitor();
        let snapshot = engine.run().await.unwrap();

        assert_eq!(snapshot.total, 0);
        assert_eq!(monitor.state(), RunState::Closed);
    }

    #[tokio::test]
    async fn setup_fault_aborts_run() {
        let mut config = RunConfig::new(Target::parse("http://127.0.0.1:9/").unwrap());
        config.workers = usize::MAX;
        config.sockets = 2;
        let engine = Engine::new(config);
        let monitor = engine.monitor();

        let result = engine.run().await;

        assert!(matches!(result, Err(SetupError::CapacityOverflow { .. })));
        assert_eq!(monitor.state(), RunState::Init);
    }
}
