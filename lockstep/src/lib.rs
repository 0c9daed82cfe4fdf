// Lockstep Round Pool Implementation
//
// Thread-backed implementation of the lockstep API: a fixed pool of worker
// threads driven one barrier-synchronized round at a time by a single
// coordinator.

pub mod barrier;
pub mod config;
pub mod driver;
pub mod logging;
pub mod pool;

// Re-export commonly used types
pub use config::RoundPoolConfig;
pub use driver::{run_rounds, FixedRounds, RunSummary};
pub use pool::{create_pool, PoolMetrics, PoolPhase, RoundPool, WorkerState, WorkerStats};
pub use lockstep_api::*;
