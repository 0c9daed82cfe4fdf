//! # Round Pool Error Types
//!
//! Errors surfaced by a round pool to its driver, and the per-slot failure
//! status a worker attaches to an item it could not process cleanly.
//!
//! ## Error Classes
//!
//! - Misuse: `InvalidPoolSize`, `RoundAlreadyInFlight`, `NoRoundInFlight`,
//!   `ItemCountMismatch`. Returned at the violating call and never retried.
//! - Recoverable: `RoundTimeout`. The round stays in flight and may be
//!   awaited again.
//! - Fatal: `WorkerSpawn`, `WorkerDisconnected`, `MissingResult`,
//!   `JoinFailed`, `Poisoned`.
//!
//! Workload failures are not `PoolError`s. They travel with the item as a
//! [`WorkFailure`] so the round still completes.
//!
//! ## Usage Example
//!
//! ```rust
//! use lockstep_api::errors::PoolError;
//!
//! fn on_error(error: PoolError) {
//!     if error.is_recoverable() {
//!         println!("straggler, waiting again: {}", error);
//!     } else {
//!         println!("pool unusable: {}", error);
//!     }
//! }
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::types::WorkerId;

/// Errors returned by round pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A pool needs at least one worker.
    #[error("Invalid pool size: {0} (a pool needs at least one worker)")]
    InvalidPoolSize(usize),

    /// `dispatch_round` was called before the previous round was awaited.
    #[error("Round {round} is still in flight")]
    RoundAlreadyInFlight { round: u64 },

    /// `await_round` was called with nothing dispatched.
    #[error("No round is in flight")]
    NoRoundInFlight,

    /// A round must carry exactly one item per worker.
    #[error("Round carries {actual} items but the pool has {expected} workers")]
    ItemCountMismatch { expected: usize, actual: usize },

    /// Not every worker reported within the allotted time.
    #[error("Round {round} timed out after {timeout:?} ({arrived}/{expected} workers reported)")]
    RoundTimeout {
        round: u64,
        timeout: Duration,
        arrived: usize,
        expected: usize,
    },

    /// The operating system refused to start a worker thread.
    #[error("Failed to spawn {worker}: {reason}")]
    WorkerSpawn { worker: WorkerId, reason: String },

    /// A worker's dispatch channel is gone, so the worker thread has exited.
    #[error("{worker} is no longer accepting work")]
    WorkerDisconnected { worker: WorkerId },

    /// A worker reported completion without handing its item back.
    #[error("{worker} reported round {round} without returning its item")]
    MissingResult { worker: WorkerId, round: u64 },

    /// Joining a worker thread failed.
    #[error("Failed to join {worker}: {reason}")]
    JoinFailed { worker: WorkerId, reason: String },

    /// An earlier fatal error left the pool unable to run rounds.
    #[error("Pool is poisoned and can only be aborted")]
    Poisoned,

    /// Internal failure.
    #[error("Internal pool error: {0}")]
    Other(#[from] anyhow::Error),
}

impl PoolError {
    /// Whether retrying the same call on the same pool may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PoolError::RoundTimeout { .. })
    }

    /// Whether this error is a contract violation by the caller.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            PoolError::InvalidPoolSize(_)
                | PoolError::RoundAlreadyInFlight { .. }
                | PoolError::NoRoundInFlight
                | PoolError::ItemCountMismatch { .. }
        )
    }
}

/// Why a worker could not process its item cleanly.
///
/// Attached to the item's slot in the round output. The barrier is credited
/// either way, so one failing worker never stalls the round.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkFailure {
    /// The workload returned an error.
    #[error("Work failed: {0}")]
    Failed(String),

    /// The workload panicked.
    #[error("Work panicked: {0}")]
    Panicked(String),
}
