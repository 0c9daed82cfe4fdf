//! # Round Driver
//!
//! Runs a pool to completion under a [`RoundPolicy`]. The policy supplies each
//! round's items and decides, round by round, whether the next one is the
//! last. The driver never infers the last round from a counter of its own.

use std::fmt;
use std::num::NonZeroU64;

use tracing::info;

use lockstep_api::errors::PoolError;
use lockstep_api::policy::{NextRound, RoundPolicy};
use lockstep_api::types::RoundOutput;
use lockstep_api::work::Work;

use crate::pool::RoundPool;

/// What a completed run produced
#[derive(Debug, Clone)]
pub struct RunSummary<T> {
    /// Rounds run, the final round included
    pub rounds: u64,
    /// Output of the final round
    pub final_output: RoundOutput<T>,
}

/// Drive `pool` until `policy` asks for the final round, run it, and join the
/// workers.
///
/// On error the pool is dropped, which cancels parked workers without waiting
/// for stragglers.
pub fn run_rounds<W, P>(mut pool: RoundPool<W>, policy: &mut P) -> Result<RunSummary<W::Item>, PoolError>
where
    W: Work,
    P: RoundPolicy<W::Item> + ?Sized,
{
    let mut next = policy.first_round(pool.size());
    let mut rounds = 0;

    loop {
        match next {
            NextRound::Continue(items) => {
                let output = pool.run_round(items)?;
                rounds += 1;
                next = policy.after_round(output);
            }
            NextRound::Finish(items) => {
                let final_output = pool.shutdown(items)?;
                rounds += 1;
                info!(rounds, "Run complete");
                return Ok(RunSummary {
                    rounds,
                    final_output,
                });
            }
        }
    }
}

/// Runs exactly `rounds` rounds, feeding each round's items into the next.
///
/// An optional observer sees every non-final round's output.
pub struct FixedRounds<T> {
    total: NonZeroU64,
    issued: u64,
    initial: Option<Vec<T>>,
    observer: Option<Box<dyn FnMut(&RoundOutput<T>)>>,
}

impl<T> FixedRounds<T> {
    pub fn new(rounds: NonZeroU64, initial: Vec<T>) -> Self {
        Self {
            total: rounds,
            issued: 0,
            initial: Some(initial),
            observer: None,
        }
    }

    /// Call `observer` with each non-final round's output.
    pub fn inspect(mut self, observer: impl FnMut(&RoundOutput<T>) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Rounds handed out so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }

    fn issue(&mut self, items: Vec<T>) -> NextRound<T> {
        self.issued += 1;
        if self.issued >= self.total.get() {
            NextRound::Finish(items)
        } else {
            NextRound::Continue(items)
        }
    }
}

impl<T> fmt::Debug for FixedRounds<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedRounds")
            .field("total", &self.total)
            .field("issued", &self.issued)
            .field("has_observer", &self.observer.is_some())
            .finish()
    }
}

impl<T> RoundPolicy<T> for FixedRounds<T> {
    fn first_round(&mut self, _pool_size: usize) -> NextRound<T> {
        let items = self.initial.take().unwrap_or_default();
        self.issue(items)
    }

    fn after_round(&mut self, output: RoundOutput<T>) -> NextRound<T> {
        if let Some(observer) = self.observer.as_mut() {
            observer(&output);
        }
        self.issue(output.into_items())
    }
}
