//! # Round Pool
//!
//! The round coordinator. Owns a fixed arena of worker threads and one
//! completion barrier, and drives them one round at a time:
//!
//! 1. `dispatch_round` arms the barrier, then moves item `i` to worker `i`
//! 2. `await_round` waits for the barrier and takes every item back
//! 3. `shutdown` runs one last round carrying the stop command and joins
//!    every worker thread
//!
//! ## Lifecycle
//! `Created -> Running -> Draining -> Joined`
//!
//! A pool whose worker vanished mid-dispatch becomes `Poisoned`; only `abort`
//! (or dropping it) is useful afterwards.
//!
//! ## Usage Example
//!
//! ```rust
//! use lockstep::{create_pool, work_fn};
//!
//! let mut pool = create_pool(2, work_fn(|_, n: &mut u32| {
//!     *n += 1;
//!     Ok(())
//! }))?;
//!
//! pool.dispatch_round(vec![0, 10])?;
//! let output = pool.await_round()?;
//! assert_eq!(output.into_items(), vec![1, 11]);
//!
//! let last = pool.shutdown(vec![1, 11])?;
//! assert_eq!(last.into_items(), vec![2, 12]);
//! # Ok::<(), lockstep::PoolError>(())
//! ```

mod worker;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use lockstep_api::errors::PoolError;
use lockstep_api::types::{PoolId, RoundOutput, Slot, WorkerId};
use lockstep_api::work::Work;

use crate::barrier::CompletionBarrier;
use crate::config::RoundPoolConfig;

use self::worker::{Command, Completed, WorkerHandle};

pub use self::worker::{WorkerState, WorkerStats};

/// Where a pool is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolPhase {
    /// Workers started, no round dispatched yet
    Created,
    /// Rounds are being dispatched
    Running,
    /// The final round has been dispatched
    Draining,
    /// Every worker thread has been joined
    Joined,
    /// A worker could not be reached; the pool can only be aborted
    Poisoned,
}

/// Snapshot of a pool's coordinator state
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    pub pool_id: PoolId,
    pub pool_size: usize,
    pub phase: PoolPhase,
    pub rounds_completed: u64,
    pub round_in_flight: Option<u64>,
    /// Round-complete notifications raised by the barrier so far
    pub notifications: u64,
}

/// Barrier-synchronized pool of worker threads driven one round at a time.
pub struct RoundPool<W: Work> {
    id: PoolId,

    config: RoundPoolConfig,

    /// Worker `i` owns slot `i` of every round
    workers: Vec<WorkerHandle<W::Item>>,

    barrier: Arc<CompletionBarrier>,

    phase: PoolPhase,

    /// Number the next dispatched round will get
    next_round: u64,

    round_in_flight: Option<u64>,

    rounds_completed: u64,
}

/// Start a pool of `size` workers running `work`, with default settings.
pub fn create_pool<W: Work>(size: usize, work: W) -> Result<RoundPool<W>, PoolError> {
    RoundPool::with_config(RoundPoolConfig::with_pool_size(size), work)
}

impl<W: Work> RoundPool<W> {
    /// Pool sized to the number of CPUs.
    pub fn new(work: W) -> Result<Self, PoolError> {
        Self::with_config(RoundPoolConfig::default(), work)
    }

    pub fn with_config(config: RoundPoolConfig, work: W) -> Result<Self, PoolError> {
        config.validate()?;

        let id = PoolId::new();
        let barrier = Arc::new(CompletionBarrier::new(config.pool_size));
        let work = Arc::new(work);

        let mut pool = Self {
            id,
            workers: Vec::with_capacity(config.pool_size),
            barrier,
            phase: PoolPhase::Created,
            next_round: 1,
            round_in_flight: None,
            rounds_completed: 0,
            config,
        };

        // On failure the partial pool is dropped, which releases the workers
        // already started
        for index in 0..pool.config.pool_size {
            let worker = WorkerHandle::spawn(
                WorkerId::from_index(index),
                id,
                Arc::clone(&work),
                Arc::clone(&pool.barrier),
                &pool.config,
            )?;
            pool.workers.push(worker);
        }

        info!(pool = %id, size = pool.config.pool_size, "Round pool started");
        Ok(pool)
    }

    /// Fan one item out to every worker. Returns the round number.
    ///
    /// `items[i]` goes to worker `i`. Fails with `RoundAlreadyInFlight` if the
    /// previous round was not awaited yet; nothing is sent in that case.
    pub fn dispatch_round(&mut self, items: Vec<W::Item>) -> Result<u64, PoolError> {
        self.dispatch(items, false)
    }

    /// Wait until every worker reported the round in flight and take the
    /// items back. Bounded by `round_timeout` when configured.
    pub fn await_round(&mut self) -> Result<RoundOutput<W::Item>, PoolError> {
        if let Some(timeout) = self.config.round_timeout {
            return self.await_round_timeout(timeout);
        }

        let round = self.pending_round()?;
        let completed = self.barrier.wait()?;
        self.finish_round(round, completed)
    }

    /// Like `await_round`, but gives up after `timeout`.
    ///
    /// A timeout leaves the round in flight: call an await method again to
    /// keep waiting, or `abort` to give up on the pool.
    pub fn await_round_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<RoundOutput<W::Item>, PoolError> {
        let round = self.pending_round()?;
        let completed = self.wait_logged(|barrier| barrier.wait_timeout(timeout))?;
        self.finish_round(round, completed)
    }

    /// Await the round in flight from async code.
    pub async fn await_round_async(&mut self) -> Result<RoundOutput<W::Item>, PoolError> {
        let round = self.pending_round()?;
        let completed = match self.config.round_timeout {
            Some(timeout) => self.barrier.wait_async_timeout(timeout).await,
            None => self.barrier.wait_async().await,
        };
        let completed = self.log_timeout(completed)?;
        self.finish_round_async(round, completed).await
    }

    pub async fn await_round_async_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<RoundOutput<W::Item>, PoolError> {
        let round = self.pending_round()?;
        let completed = self.barrier.wait_async_timeout(timeout).await;
        let completed = self.log_timeout(completed)?;
        self.finish_round_async(round, completed).await
    }

    /// Dispatch a round and wait for it.
    pub fn run_round(&mut self, items: Vec<W::Item>) -> Result<RoundOutput<W::Item>, PoolError> {
        self.dispatch_round(items)?;
        self.await_round()
    }

    /// Run one final round with `final_items`, then join every worker.
    ///
    /// Each worker processes and reports its last item before it exits. The
    /// final round is never bounded by `round_timeout`: once dispatched, this
    /// returns only after every worker thread has been joined, whatever the
    /// outcome. Consumes the pool, so it cannot be shut down twice.
    pub fn shutdown(mut self, final_items: Vec<W::Item>) -> Result<RoundOutput<W::Item>, PoolError> {
        let round = self.dispatch(final_items, true)?;
        info!(pool = %self.id, round, "Final round dispatched, draining workers");

        let output = self.drain_final_round(round);
        let joined = self.join_workers();
        let output = output?;
        joined?;

        info!(pool = %self.id, rounds = self.rounds_completed, "Round pool shut down");
        Ok(output)
    }

    /// Cancel the pool without a final round.
    ///
    /// Parked workers exit right away; a worker in the middle of an item
    /// finishes it first, so this blocks for as long as the slowest item.
    pub fn abort(mut self) -> Result<(), PoolError> {
        warn!(pool = %self.id, round_in_flight = ?self.round_in_flight, "Aborting round pool");
        self.join_workers()
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    pub fn phase(&self) -> PoolPhase {
        self.phase
    }

    pub fn config(&self) -> &RoundPoolConfig {
        &self.config
    }

    pub fn round_in_flight(&self) -> Option<u64> {
        self.round_in_flight
    }

    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed
    }

    /// Barrier arrivals for the current round (snapshot).
    pub fn arrived(&self) -> usize {
        self.barrier.arrived()
    }

    pub fn worker_stats(&self) -> Vec<WorkerStats> {
        self.workers.iter().map(WorkerHandle::stats).collect()
    }

    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            pool_id: self.id,
            pool_size: self.workers.len(),
            phase: self.phase,
            rounds_completed: self.rounds_completed,
            round_in_flight: self.round_in_flight,
            notifications: self.barrier.notifications(),
        }
    }

    fn ensure_usable(&self) -> Result<(), PoolError> {
        match self.phase {
            PoolPhase::Poisoned | PoolPhase::Joined => Err(PoolError::Poisoned),
            _ => Ok(()),
        }
    }

    fn pending_round(&self) -> Result<u64, PoolError> {
        self.ensure_usable()?;
        self.round_in_flight.ok_or(PoolError::NoRoundInFlight)
    }

    fn dispatch(&mut self, items: Vec<W::Item>, finish: bool) -> Result<u64, PoolError> {
        self.ensure_usable()?;

        if let Some(round) = self.round_in_flight {
            return Err(PoolError::RoundAlreadyInFlight { round });
        }
        if items.len() != self.workers.len() {
            return Err(PoolError::ItemCountMismatch {
                expected: self.workers.len(),
                actual: items.len(),
            });
        }

        let round = self.next_round;

        // Arm the barrier before any worker can report for this round
        self.barrier.reset(round);

        for (worker, item) in self.workers.iter().zip(items) {
            let command = if finish {
                Command::Finish { round, item }
            } else {
                Command::Process { round, item }
            };

            if let Err(err) = worker.send(command) {
                crate::log_error!(err, pool = %self.id, round);
                self.phase = PoolPhase::Poisoned;
                return Err(err);
            }
        }

        self.next_round += 1;
        self.round_in_flight = Some(round);
        self.phase = if finish {
            PoolPhase::Draining
        } else {
            PoolPhase::Running
        };

        crate::log_round!(round, "dispatched", workers = self.workers.len(), finish);
        Ok(round)
    }

    fn drain_final_round(&mut self, round: u64) -> Result<RoundOutput<W::Item>, PoolError> {
        let completed = self.barrier.wait()?;
        self.finish_round(round, completed)
    }

    fn wait_logged(
        &self,
        wait: impl FnOnce(&CompletionBarrier) -> Result<u64, PoolError>,
    ) -> Result<u64, PoolError> {
        self.log_timeout(wait(&self.barrier))
    }

    fn log_timeout(&self, result: Result<u64, PoolError>) -> Result<u64, PoolError> {
        if let Err(err @ PoolError::RoundTimeout { .. }) = &result {
            warn!(pool = %self.id, error = %err, "Round is taking too long");
        }
        result
    }

    fn finish_round(
        &mut self,
        round: u64,
        completed: u64,
    ) -> Result<RoundOutput<W::Item>, PoolError> {
        debug_assert_eq!(round, completed, "barrier completed an unexpected round");
        let arrived = self.barrier.arrived();

        let mut slots = Vec::with_capacity(self.workers.len());
        for index in 0..self.workers.len() {
            let result = self.workers[index].take_result(round);
            slots.push(self.slot_from(index, result)?);
        }

        Ok(self.close_round(round, arrived, slots))
    }

    async fn finish_round_async(
        &mut self,
        round: u64,
        completed: u64,
    ) -> Result<RoundOutput<W::Item>, PoolError> {
        debug_assert_eq!(round, completed, "barrier completed an unexpected round");
        let arrived = self.barrier.arrived();

        let mut slots = Vec::with_capacity(self.workers.len());
        for index in 0..self.workers.len() {
            let result = self.workers[index].take_result_async(round).await;
            slots.push(self.slot_from(index, result)?);
        }

        Ok(self.close_round(round, arrived, slots))
    }

    fn slot_from(
        &mut self,
        index: usize,
        result: Result<Completed<W::Item>, PoolError>,
    ) -> Result<Slot<W::Item>, PoolError> {
        match result {
            Ok(completed) => Ok(Slot {
                worker: self.workers[index].id(),
                item: completed.item,
                outcome: completed.outcome,
            }),
            Err(err) => {
                crate::log_error!(err, pool = %self.id);
                self.phase = PoolPhase::Poisoned;
                Err(err)
            }
        }
    }

    fn close_round(
        &mut self,
        round: u64,
        arrived: usize,
        slots: Vec<Slot<W::Item>>,
    ) -> RoundOutput<W::Item> {
        self.round_in_flight = None;
        self.rounds_completed += 1;

        let output = RoundOutput {
            round,
            completed: arrived,
            slots,
        };

        let failed = output.failures().count();
        if failed > 0 {
            warn!(pool = %self.id, round, failed, "Round completed with failed items");
        }
        crate::log_round!(round, "complete", arrived, failed);

        output
    }

    /// Disconnect and join every worker, reporting the first join failure.
    fn join_workers(&mut self) -> Result<(), PoolError> {
        for worker in &mut self.workers {
            worker.disconnect();
        }

        let mut first_error = None;
        for worker in &mut self.workers {
            if let Err(err) = worker.join() {
                crate::log_error!(err, pool = %self.id);
                first_error.get_or_insert(err);
            }
        }

        self.phase = PoolPhase::Joined;
        self.round_in_flight = None;

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<W: Work> Drop for RoundPool<W> {
    fn drop(&mut self) {
        if self.phase == PoolPhase::Joined {
            return;
        }

        // Never block here: a straggler would hang the dropping thread.
        // Disconnected workers exit on their own and their threads detach.
        debug!(pool = %self.id, phase = ?self.phase, "Dropping round pool without shutdown, detaching workers");
        for worker in &mut self.workers {
            worker.disconnect();
        }
    }
}

impl<W: Work> fmt::Debug for RoundPool<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoundPool")
            .field("id", &self.id)
            .field("size", &self.workers.len())
            .field("phase", &self.phase)
            .field("round_in_flight", &self.round_in_flight)
            .field("rounds_completed", &self.rounds_completed)
            .finish()
    }
}
