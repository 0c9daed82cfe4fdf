use std::fmt;

use uuid::Uuid;

use crate::errors::WorkFailure;

// Type aliases for common types
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
pub type WorkResult = Result<(), BoxError>;

/// Identity of one worker in a pool.
///
/// Stores the arena index (0..N-1). Humans see the worker number (1..N).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(usize);

impl WorkerId {
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    /// Position in the pool's worker arena.
    pub fn index(&self) -> usize {
        self.0
    }

    /// One-based worker number.
    pub fn number(&self) -> usize {
        self.0 + 1
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.number())
    }
}

/// Unique identity of a pool instance, carried in log spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolId(Uuid);

impl PoolId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PoolId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One worker's share of a finished round.
#[derive(Debug, Clone)]
pub struct Slot<T> {
    /// Worker that processed the item
    pub worker: WorkerId,

    /// The item, holding whatever the worker wrote into it
    pub item: T,

    /// Failure status for this item
    pub outcome: Result<(), WorkFailure>,
}

impl<T> Slot<T> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Everything a round produced, ordered by worker index.
#[derive(Debug, Clone)]
pub struct RoundOutput<T> {
    /// Round number, starting at 1
    pub round: u64,

    /// Barrier arrivals counted when the round was awaited
    pub completed: usize,

    /// Slot `i` belongs to worker `i`
    pub slots: Vec<Slot<T>>,
}

impl<T> RoundOutput<T> {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().map(|slot| &slot.item)
    }

    /// Takes the items back, dropping per-slot status. Useful for feeding one
    /// round's results into the next round.
    pub fn into_items(self) -> Vec<T> {
        self.slots.into_iter().map(|slot| slot.item).collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = (WorkerId, &WorkFailure)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.outcome.as_ref().err().map(|e| (slot.worker, e)))
    }

    pub fn is_success(&self) -> bool {
        self.slots.iter().all(Slot::is_success)
    }
}
