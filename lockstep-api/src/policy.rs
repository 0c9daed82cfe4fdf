//! # Round Policy
//!
//! The external decision maker that sits in front of a pool. It supplies the
//! items for every round, consumes each round's output, and decides whether
//! another round follows. Stopping is always an explicit decision: the policy
//! hands over the payload of the last round with [`NextRound::Finish`], which
//! the pool runs before its workers exit.

use crate::types::RoundOutput;

/// What the pool should do after a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextRound<T> {
    /// Run another round with these items.
    Continue(Vec<T>),

    /// Run one last round with these items, then shut down.
    Finish(Vec<T>),
}

impl<T> NextRound<T> {
    pub fn items(&self) -> &[T] {
        match self {
            NextRound::Continue(items) | NextRound::Finish(items) => items,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, NextRound::Finish(_))
    }
}

/// Work-item source and result sink for a round pool.
pub trait RoundPolicy<T> {
    /// Items for round 1, or the final round if the policy wants only one.
    fn first_round(&mut self, pool_size: usize) -> NextRound<T>;

    /// Consume a finished, non-final round and decide what follows.
    fn after_round(&mut self, output: RoundOutput<T>) -> NextRound<T>;
}
