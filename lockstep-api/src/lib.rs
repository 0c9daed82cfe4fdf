//! # Lockstep Round Pool API
//!
//! Abstract surface of a barrier-synchronized worker pool. A single driver
//! fans one round of work out to a fixed set of N workers, waits until every
//! worker has reported, takes the results back, and then either starts the
//! next round or shuts the pool down.
//!
//! ## Core Components
//!
//! - **Work**: the computation each worker runs against its item
//! - **Round output**: items handed back after a round, one slot per worker
//! - **Round policy**: the external source/sink that decides when to stop
//! - **Errors**: coordinator errors and per-slot failure status
//!
//! ## Module Organization
//!
//! - [`work`]: the [`Work`] trait and closure adapter
//! - [`types`]: identities and round output types
//! - [`policy`]: [`RoundPolicy`] and [`NextRound`]
//! - [`errors`]: [`PoolError`] and [`WorkFailure`]

pub mod errors;
pub mod policy;
pub mod types;
pub mod work;

pub use errors::{PoolError, WorkFailure};
pub use policy::{NextRound, RoundPolicy};
pub use types::{BoxError, PoolId, RoundOutput, Slot, WorkResult, WorkerId};
pub use work::{work_fn, FnWork, Work};
