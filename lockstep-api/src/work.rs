//! # Work Definition
//!
//! A [`Work`] implementation is what every worker in a pool runs against its
//! item each round. One instance is shared by all workers, so per-worker state
//! belongs in the item rather than in the `Work` value.
//!
//! ## Usage Example
//!
//! ```rust
//! use lockstep_api::work::{work_fn, Work};
//! use lockstep_api::types::WorkerId;
//!
//! let doubling = work_fn(|_worker: WorkerId, value: &mut u64| {
//!     *value *= 2;
//!     Ok(())
//! });
//!
//! let mut item = 21;
//! doubling.execute(WorkerId::from_index(0), &mut item).unwrap();
//! assert_eq!(item, 42);
//! ```

use std::fmt;
use std::marker::PhantomData;

use crate::types::{WorkResult, WorkerId};

/// The per-round computation run by every worker.
pub trait Work: Send + Sync + 'static {
    /// Payload handed to one worker for one round. Results are written back
    /// into the same value.
    type Item: Send + 'static;

    /// Process `item` in place. Errors and panics are caught by the worker and
    /// attached to the item's slot.
    fn execute(&self, worker: WorkerId, item: &mut Self::Item) -> WorkResult;

    /// Runs on the worker thread before it waits for its first round.
    fn on_worker_start(&self, _worker: WorkerId) {}

    /// Runs on the worker thread right before it exits.
    fn on_worker_stop(&self, _worker: WorkerId) {}
}

/// [`Work`] backed by a closure.
pub struct FnWork<F, T> {
    f: F,
    _item: PhantomData<fn(&mut T)>,
}

impl<F, T> fmt::Debug for FnWork<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWork").finish_non_exhaustive()
    }
}

impl<F, T> Work for FnWork<F, T>
where
    F: Fn(WorkerId, &mut T) -> WorkResult + Send + Sync + 'static,
    T: Send + 'static,
{
    type Item = T;

    fn execute(&self, worker: WorkerId, item: &mut T) -> WorkResult {
        (self.f)(worker, item)
    }
}

/// Wrap a closure as [`Work`].
pub fn work_fn<F, T>(f: F) -> FnWork<F, T>
where
    F: Fn(WorkerId, &mut T) -> WorkResult + Send + Sync + 'static,
    T: Send + 'static,
{
    FnWork {
        f,
        _item: PhantomData,
    }
}
