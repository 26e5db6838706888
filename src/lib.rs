pub mod config;
pub mod connection_pool;
pub mod engine;
pub mod report;
pub mod request;
pub mod stats;
pub mod striker;
pub mod worker;

pub use config::{MethodMode, RunConfig, Settings, Target};
pub use engine::{Engine, RunState, StatsMonitor, StopHandle};
pub use stats::StatsSnapshot;
