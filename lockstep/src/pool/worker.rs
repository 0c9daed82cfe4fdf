//! # Worker Unit
//!
//! One OS thread per worker. The thread parks on its private command channel,
//! processes the item it receives, hands the item back on its return channel,
//! credits the completion barrier, and parks again. A `Finish` command is the
//! typed shutdown signal: the worker completes and reports that last item
//! before it exits, so no assignment is ever abandoned.
//!
//! ## State Machine
//! `WaitingForWork -> Processing -> WaitingForWork ... -> Done`
//!
//! A disconnected command channel means the pool was aborted or dropped; the
//! worker treats it as cancellation at its wait point and goes to `Done`.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender};
use tracing::{debug, warn};

use lockstep_api::errors::{PoolError, WorkFailure};
use lockstep_api::types::{PoolId, WorkerId};
use lockstep_api::work::Work;

use crate::barrier::CompletionBarrier;
use crate::config::RoundPoolConfig;
use crate::logging;

/// States a worker can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Parked until the coordinator dispatches an item
    WaitingForWork = 0,
    /// Running the workload on its item
    Processing = 1,
    /// Exited, or about to exit after its final report
    Done = 2,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerState::WaitingForWork,
            1 => WorkerState::Processing,
            _ => WorkerState::Done,
        }
    }
}

/// Point-in-time view of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub id: WorkerId,
    pub state: WorkerState,
    /// Items processed since the pool started
    pub processed: u64,
}

/// Message from the coordinator to one worker.
pub(crate) enum Command<T> {
    /// Process the item and wait for the next command
    Process { round: u64, item: T },
    /// Process the item, report, then exit
    Finish { round: u64, item: T },
}

/// An item on its way back to the coordinator.
pub(crate) struct Completed<T> {
    pub round: u64,
    pub item: T,
    pub outcome: Result<(), WorkFailure>,
}

/// Coordinator-side handle to a worker thread.
pub(crate) struct WorkerHandle<T> {
    id: WorkerId,

    /// Dropped to cancel the worker at its wait point
    commands: Option<Sender<Command<T>>>,

    results: Receiver<Completed<T>>,

    state: Arc<AtomicU8>,

    processed: Arc<AtomicU64>,

    thread: Option<JoinHandle<()>>,
}

impl<T> WorkerHandle<T> {
    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }
}

impl<T> fmt::Debug for WorkerHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("processed", &self.processed.load(Ordering::Relaxed))
            .field("connected", &self.commands.is_some())
            .field("has_thread", &self.thread.is_some())
            .finish()
    }
}

impl<T: Send + 'static> WorkerHandle<T> {
    /// Start the worker thread for `id`.
    pub fn spawn<W>(
        id: WorkerId,
        pool_id: PoolId,
        work: Arc<W>,
        barrier: Arc<CompletionBarrier>,
        config: &RoundPoolConfig,
    ) -> Result<Self, PoolError>
    where
        W: Work<Item = T>,
    {
        // One slot each way: a round never has more than one item per worker
        let (command_tx, command_rx) = flume::bounded(1);
        let (result_tx, result_rx) = flume::bounded(1);
        let state = Arc::new(AtomicU8::new(WorkerState::WaitingForWork as u8));
        let processed = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            id,
            work,
            barrier,
            commands: command_rx,
            results: result_tx,
            state: Arc::clone(&state),
            processed: Arc::clone(&processed),
        };

        let mut builder = thread::Builder::new().name(config.thread_name(id.index()));
        if let Some(stack_size) = config.thread_stack_size {
            builder = builder.stack_size(stack_size);
        }

        let dispatch = logging::current_subscriber();
        let thread = builder
            .spawn(move || {
                tracing::dispatcher::with_default(&dispatch, || {
                    let pool_span = crate::pool_span!(pool_id);
                    let _pool = pool_span.enter();
                    let worker_span = crate::worker_span!(id);
                    let _worker = worker_span.enter();
                    worker.run();
                })
            })
            .map_err(|e| PoolError::WorkerSpawn {
                worker: id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            commands: Some(command_tx),
            results: result_rx,
            state,
            processed,
            thread: Some(thread),
        })
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            id: self.id,
            state: self.state(),
            processed: self.processed.load(Ordering::Relaxed),
        }
    }

    /// Hand a command to the worker. Never blocks while the pool keeps at most
    /// one round in flight.
    pub fn send(&self, command: Command<T>) -> Result<(), PoolError> {
        let commands = self
            .commands
            .as_ref()
            .ok_or(PoolError::WorkerDisconnected { worker: self.id })?;

        commands
            .send(command)
            .map_err(|_| PoolError::WorkerDisconnected { worker: self.id })
    }

    /// Take back the item for `round`.
    ///
    /// Called after the barrier fired. Each worker sends its item before it
    /// reports, so the blocking receive returns at once; blocking rather than
    /// polling keeps this correct even though the barrier counter is relaxed.
    pub fn take_result(&self, round: u64) -> Result<Completed<T>, PoolError> {
        let completed = self.results.recv().map_err(|_| PoolError::MissingResult {
            worker: self.id,
            round,
        })?;
        self.check_round(completed, round)
    }

    pub async fn take_result_async(&self, round: u64) -> Result<Completed<T>, PoolError> {
        let completed = self
            .results
            .recv_async()
            .await
            .map_err(|_| PoolError::MissingResult {
                worker: self.id,
                round,
            })?;
        self.check_round(completed, round)
    }

    fn check_round(&self, completed: Completed<T>, round: u64) -> Result<Completed<T>, PoolError> {
        if completed.round != round {
            return Err(anyhow::anyhow!(
                "{} returned an item from round {} while collecting round {}",
                self.id,
                completed.round,
                round
            )
            .into());
        }
        Ok(completed)
    }

    /// Drop the command channel. A worker parked on it exits; a worker in the
    /// middle of an item finishes it first.
    pub fn disconnect(&mut self) {
        self.commands.take();
    }

    /// Disconnect and wait for the thread to exit.
    pub fn join(&mut self) -> Result<(), PoolError> {
        self.disconnect();

        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        thread.join().map_err(|payload| PoolError::JoinFailed {
            worker: self.id,
            reason: panic_message(payload.as_ref()),
        })
    }
}

/// The part of a worker that lives on its thread.
struct Worker<W: Work> {
    id: WorkerId,
    work: Arc<W>,
    barrier: Arc<CompletionBarrier>,
    commands: Receiver<Command<W::Item>>,
    results: Sender<Completed<W::Item>>,
    state: Arc<AtomicU8>,
    processed: Arc<AtomicU64>,
}

impl<W: Work> Worker<W> {
    fn run(self) {
        self.hook("start", |work, id| work.on_worker_start(id));
        crate::log_worker!(self.id, "started");

        loop {
            self.set_state(WorkerState::WaitingForWork);

            let (round, mut item, finish) = match self.commands.recv() {
                Ok(Command::Process { round, item }) => (round, item, false),
                Ok(Command::Finish { round, item }) => (round, item, true),
                Err(_) => {
                    crate::log_worker!(self.id, "cancelled");
                    break;
                }
            };

            self.set_state(WorkerState::Processing);
            crate::log_worker!(self.id, "processing", round);

            let outcome = self.execute(&mut item);
            if let Err(failure) = &outcome {
                warn!(worker = %self.id, round, %failure, "Work item failed");
            }
            self.processed.fetch_add(1, Ordering::Relaxed);

            // Publish the next state before handing the item back, so the
            // coordinator sees it once it holds the item
            let next = if finish {
                WorkerState::Done
            } else {
                WorkerState::WaitingForWork
            };
            self.set_state(next);

            if self.results.send(Completed { round, item, outcome }).is_err() {
                debug!(worker = %self.id, round, "Coordinator gone, dropping result");
                break;
            }

            let last = self.barrier.report(round);
            crate::log_worker!(self.id, "reported", round, last);

            if finish {
                crate::log_worker!(self.id, "finished", round);
                break;
            }
        }

        self.set_state(WorkerState::Done);
        self.hook("stop", |work, id| work.on_worker_stop(id));
    }

    fn execute(&self, item: &mut W::Item) -> Result<(), WorkFailure> {
        let work = &self.work;
        let id = self.id;

        match panic::catch_unwind(AssertUnwindSafe(|| work.execute(id, item))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(WorkFailure::Failed(err.to_string())),
            Err(payload) => Err(WorkFailure::Panicked(panic_message(payload.as_ref()))),
        }
    }

    /// Run a lifecycle hook without letting a panic take the thread down.
    fn hook(&self, name: &str, f: impl FnOnce(&W, WorkerId)) {
        let work: &W = &self.work;
        let id = self.id;

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(work, id))) {
            crate::log_error!(panic_message(payload.as_ref()), worker = %id, hook = name);
        }
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    }
}
