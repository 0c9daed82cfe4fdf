// Running pools to completion under a round policy

mod test_helpers;

use std::num::NonZeroU64;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use lockstep::{create_pool, logging, run_rounds, FixedRounds, NextRound, PoolError, RoundOutput, RoundPolicy};
use test_helpers::{Counters, CountingWork, LifecycleWork};

#[test]
fn test_fixed_rounds_runs_exactly_that_many() {
    logging::init_test();

    let pool = create_pool(4, CountingWork).unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let mut policy = FixedRounds::new(NonZeroU64::new(8).unwrap(), vec![Counters::default(); 4])
        .inspect(move |output| sink.lock().unwrap().push(output.round));

    let summary = run_rounds(pool, &mut policy).unwrap();

    assert_eq!(summary.rounds, 8);
    assert_eq!(summary.final_output.round, 8);
    assert!(summary
        .final_output
        .items()
        .all(|c| *c == Counters { data1: 8, data2: 8 }));

    // The observer sees the seven rounds before the final one
    assert_eq!(*seen.lock().unwrap(), (1..=7).collect::<Vec<u64>>());
    assert_eq!(policy.issued(), 8);
}

#[test]
fn test_single_fixed_round_is_the_final_round() {
    logging::init_test();

    let work = LifecycleWork::default();
    let stopped = work.stopped.clone();
    let pool = create_pool(3, work).unwrap();

    let mut policy = FixedRounds::new(NonZeroU64::MIN, vec![5, 6, 7]);
    let summary = run_rounds(pool, &mut policy).unwrap();

    assert_eq!(summary.rounds, 1);
    assert_eq!(summary.final_output.into_items(), vec![6, 7, 8]);
    assert_eq!(stopped.load(Ordering::SeqCst), 3);
}

/// Keeps going until every worker's counter reaches a target
struct UntilTarget {
    target: u32,
    rounds_seen: u64,
}

impl RoundPolicy<u32> for UntilTarget {
    fn first_round(&mut self, pool_size: usize) -> NextRound<u32> {
        NextRound::Continue(vec![0; pool_size])
    }

    fn after_round(&mut self, output: RoundOutput<u32>) -> NextRound<u32> {
        self.rounds_seen += 1;
        let items = output.into_items();
        if items.iter().all(|n| n + 1 >= self.target) {
            NextRound::Finish(items)
        } else {
            NextRound::Continue(items)
        }
    }
}

#[test]
fn test_policy_decides_when_to_stop() {
    logging::init_test();

    let pool = create_pool(2, LifecycleWork::default()).unwrap();
    let mut policy = UntilTarget {
        target: 5,
        rounds_seen: 0,
    };

    let summary = run_rounds(pool, &mut policy).unwrap();

    assert_eq!(summary.rounds, 5);
    assert_eq!(policy.rounds_seen, 4);
    assert_eq!(summary.final_output.into_items(), vec![5, 5]);
}

/// Hands the pool the wrong number of items on its second round
struct Miscounted;

impl RoundPolicy<u32> for Miscounted {
    fn first_round(&mut self, pool_size: usize) -> NextRound<u32> {
        NextRound::Continue(vec![0; pool_size])
    }

    fn after_round(&mut self, _output: RoundOutput<u32>) -> NextRound<u32> {
        NextRound::Continue(vec![0])
    }
}

#[test]
fn test_driver_propagates_pool_errors() {
    logging::init_test();

    let work = LifecycleWork::default();
    let stopped = work.stopped.clone();
    let pool = create_pool(2, work).unwrap();

    let err = run_rounds(pool, &mut Miscounted).unwrap_err();
    assert!(matches!(
        err,
        PoolError::ItemCountMismatch {
            expected: 2,
            actual: 1
        }
    ));

    // The dropped pool released its workers
    assert!(test_helpers::eventually(test_helpers::PROMPT, || {
        stopped.load(Ordering::SeqCst) == 2
    }));
}

#[test]
fn test_boxed_policy_drives_pool() {
    logging::init_test();

    let pool = create_pool(2, LifecycleWork::default()).unwrap();
    let mut policy: Box<dyn RoundPolicy<u32>> =
        Box::new(FixedRounds::new(NonZeroU64::new(3).unwrap(), vec![0, 0]));

    let summary = run_rounds(pool, policy.as_mut()).unwrap();
    assert_eq!(summary.final_output.into_items(), vec![3, 3]);
}
