#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use lockstep::{Work, WorkResult, WorkerId};

/// Two counters bumped once per round, the stand-in accelerator workload
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Counters {
    pub data1: u64,
    pub data2: u64,
}

pub struct CountingWork;

impl Work for CountingWork {
    type Item = Counters;

    fn execute(&self, _worker: WorkerId, item: &mut Counters) -> WorkResult {
        item.data1 += 1;
        item.data2 += 1;
        Ok(())
    }
}

/// Item tagged with the round it was dispatched in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tagged {
    pub round: u64,
    pub hits: u32,
}

impl Tagged {
    pub fn batch(round: u64, size: usize) -> Vec<Tagged> {
        vec![Tagged { round, hits: 0 }; size]
    }
}

/// Records which round tags each worker saw, in the order it saw them
pub struct LedgerWork {
    pub ledger: Arc<Mutex<Vec<Vec<u64>>>>,
}

impl LedgerWork {
    pub fn new(size: usize) -> (Self, Arc<Mutex<Vec<Vec<u64>>>>) {
        let ledger = Arc::new(Mutex::new(vec![Vec::new(); size]));
        (
            Self {
                ledger: Arc::clone(&ledger),
            },
            ledger,
        )
    }
}

impl Work for LedgerWork {
    type Item = Tagged;

    fn execute(&self, worker: WorkerId, item: &mut Tagged) -> WorkResult {
        item.hits += 1;
        self.ledger.lock().unwrap()[worker.index()].push(item.round);
        Ok(())
    }
}

/// Counts worker thread starts and stops
#[derive(Clone, Default)]
pub struct LifecycleWork {
    pub started: Arc<AtomicUsize>,
    pub stopped: Arc<AtomicUsize>,
}

impl Work for LifecycleWork {
    type Item = u32;

    fn execute(&self, _worker: WorkerId, item: &mut u32) -> WorkResult {
        *item += 1;
        Ok(())
    }

    fn on_worker_start(&self, _worker: WorkerId) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_worker_stop(&self, _worker: WorkerId) {
        self.stopped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sleeps for the duration carried by the item
pub struct SleepWork;

impl Work for SleepWork {
    type Item = Duration;

    fn execute(&self, _worker: WorkerId, item: &mut Duration) -> WorkResult {
        thread::sleep(*item);
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Default bound for anything that should finish promptly
pub const PROMPT: Duration = Duration::from_secs(5);
