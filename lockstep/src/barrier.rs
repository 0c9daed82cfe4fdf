//! # Completion Barrier
//!
//! Fan-in point shared by every worker of a pool. Each worker credits the
//! barrier once per round after handing its item back; the worker whose credit
//! brings the count to the pool size raises the round-complete notification.
//!
//! ## Protocol
//! 1. The coordinator calls [`CompletionBarrier::reset`] before it signals any
//!    worker for a new round.
//! 2. Every worker calls [`CompletionBarrier::report`] exactly once per round.
//! 3. The coordinator blocks in one of the `wait` methods, which consume the
//!    notification.
//!
//! The arrival counter is a relaxed atomic. Nothing else depends on its value
//! except the equality test against the pool size, and the fetch-and-add makes
//! that test true for exactly one caller per round. The notification itself
//! travels over a single-slot channel, so the waiter never sees a spurious
//! wake-up and a notification raised before the waiter arrives is not lost.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{trace, warn};

use lockstep_api::errors::PoolError;

pub struct CompletionBarrier {
    /// Arrivals needed to complete a round
    parties: usize,

    /// Arrivals so far in the current round
    arrived: AtomicUsize,

    /// Round currently being counted
    round: AtomicU64,

    /// Total notifications raised over the barrier's lifetime
    notifications: AtomicU64,

    notify_tx: Sender<u64>,
    notify_rx: Receiver<u64>,
}

impl fmt::Debug for CompletionBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionBarrier")
            .field("parties", &self.parties)
            .field("arrived", &self.arrived())
            .field("round", &self.round())
            .field("notifications", &self.notifications())
            .finish()
    }
}

impl CompletionBarrier {
    /// Barrier for `parties` workers. Callers validate `parties > 0`.
    pub fn new(parties: usize) -> Self {
        let (notify_tx, notify_rx) = flume::bounded(1);

        Self {
            parties,
            arrived: AtomicUsize::new(0),
            round: AtomicU64::new(0),
            notifications: AtomicU64::new(0),
            notify_tx,
            notify_rx,
        }
    }

    /// Arm the barrier for `round`.
    ///
    /// Must happen before any worker is signalled for that round, and never
    /// while the previous round is still in flight.
    pub fn reset(&self, round: u64) {
        self.arrived.store(0, Ordering::Relaxed);
        self.round.store(round, Ordering::Relaxed);

        let stale = self.notify_rx.drain().count();
        if stale > 0 {
            warn!(round, stale, "Discarded unconsumed round-complete notification");
        }
    }

    /// Credit one arrival. Returns `true` for the single caller that completed
    /// the round; that caller has already raised the notification.
    pub fn report(&self, round: u64) -> bool {
        let arrived = self.arrived.fetch_add(1, Ordering::Relaxed) + 1;
        debug_assert!(
            arrived <= self.parties,
            "barrier over-credited: {} arrivals for {} parties",
            arrived,
            self.parties
        );
        trace!(round, arrived, parties = self.parties, "Worker reported");

        if arrived != self.parties {
            return false;
        }

        self.notifications.fetch_add(1, Ordering::Relaxed);
        match self.notify_tx.try_send(round) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(round, "Round-complete notification already pending");
            }
            // The barrier owns the receiver, so this cannot happen while `self` lives
            Err(TrySendError::Disconnected(_)) => {}
        }
        true
    }

    /// Block until the current round completes. Returns the completed round.
    pub fn wait(&self) -> Result<u64, PoolError> {
        self.notify_rx
            .recv()
            .map_err(|_| anyhow!("completion channel closed").into())
    }

    /// Block until the current round completes or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<u64, PoolError> {
        match self.notify_rx.recv_timeout(timeout) {
            Ok(round) => Ok(round),
            Err(RecvTimeoutError::Timeout) => Err(PoolError::RoundTimeout {
                round: self.round(),
                timeout,
                arrived: self.arrived(),
                expected: self.parties,
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(anyhow!("completion channel closed").into())
            }
        }
    }

    /// Wait for the current round from async code.
    pub async fn wait_async(&self) -> Result<u64, PoolError> {
        self.notify_rx
            .recv_async()
            .await
            .map_err(|_| anyhow!("completion channel closed").into())
    }

    /// Async wait bounded by `timeout`.
    pub async fn wait_async_timeout(&self, timeout: Duration) -> Result<u64, PoolError> {
        match tokio::time::timeout(timeout, self.wait_async()).await {
            Ok(result) => result,
            Err(_) => Err(PoolError::RoundTimeout {
                round: self.round(),
                timeout,
                arrived: self.arrived(),
                expected: self.parties,
            }),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Arrivals so far in the current round (snapshot).
    pub fn arrived(&self) -> usize {
        self.arrived.load(Ordering::Relaxed)
    }

    pub fn round(&self) -> u64 {
        self.round.load(Ordering::Relaxed)
    }

    /// Notifications raised since the barrier was built.
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Whether a notification is waiting to be consumed.
    pub fn is_notified(&self) -> bool {
        !self.notify_rx.is_empty()
    }
}
