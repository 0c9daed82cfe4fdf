// Failing, panicking and slow work items

mod test_helpers;

use std::time::Duration;

use lockstep::{create_pool, logging, work_fn, PoolError, PoolPhase, RoundPool, RoundPoolConfig, WorkFailure};
use test_helpers::SleepWork;

#[test]
fn test_panicking_item_does_not_stall_the_round() {
    logging::init_test();

    let mut pool = create_pool(4, work_fn(|worker, n: &mut u32| {
        if *n == 0 {
            panic!("bad item on {}", worker);
        }
        *n += 1;
        Ok(())
    }))
    .unwrap();

    pool.dispatch_round(vec![1, 1, 0, 1]).unwrap();
    let output = pool.await_round_timeout(Duration::from_secs(5)).unwrap();

    assert_eq!(output.completed, 4);
    assert!(!output.is_success());

    let failures: Vec<_> = output.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0.index(), 2);
    assert_eq!(
        failures[0].1,
        &WorkFailure::Panicked("bad item on worker-3".to_string())
    );

    // The other slots went through untouched by the panic
    assert_eq!(output.slots[0].item, 2);
    assert_eq!(output.slots[2].item, 0);

    // The panicking worker keeps serving rounds
    let output = pool.run_round(vec![1, 1, 1, 1]).unwrap();
    assert!(output.is_success());
    assert_eq!(output.into_items(), vec![2, 2, 2, 2]);

    pool.shutdown(vec![1, 1, 1, 1]).unwrap();
}

#[test]
fn test_failed_item_is_reported_on_its_slot() {
    logging::init_test();

    let mut pool = create_pool(3, work_fn(|_, n: &mut i32| {
        if *n < 0 {
            return Err(format!("negative input {}", n).into());
        }
        *n *= 10;
        Ok(())
    }))
    .unwrap();

    let output = pool.run_round(vec![1, -2, 3]).unwrap();
    assert_eq!(output.completed, 3);

    assert!(output.slots[0].is_success());
    assert_eq!(
        output.slots[1].outcome,
        Err(WorkFailure::Failed("negative input -2".to_string()))
    );
    assert!(output.slots[2].is_success());
    assert_eq!(output.into_items(), vec![10, -2, 30]);

    assert_eq!(pool.phase(), PoolPhase::Running);
    pool.shutdown(vec![0, 0, 0]).unwrap();
}

#[test]
fn test_panic_in_final_round_still_joins() {
    logging::init_test();

    let pool = create_pool(2, work_fn(|_, n: &mut u32| {
        if *n == 0 {
            panic!("boom");
        }
        Ok(())
    }))
    .unwrap();

    let last = pool.shutdown(vec![0, 1]).unwrap();
    assert_eq!(last.completed, 2);
    assert_eq!(last.failures().count(), 1);
}

#[test]
fn test_straggler_times_out_then_completes() {
    logging::init_test();

    let mut pool = create_pool(3, SleepWork).unwrap();
    pool.dispatch_round(vec![
        Duration::ZERO,
        Duration::from_millis(300),
        Duration::ZERO,
    ])
    .unwrap();

    let err = pool.await_round_timeout(Duration::from_millis(20)).unwrap_err();
    match &err {
        PoolError::RoundTimeout {
            round,
            expected,
            arrived,
            ..
        } => {
            assert_eq!(*round, 1);
            assert_eq!(*expected, 3);
            assert!(*arrived < 3);
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
    assert!(err.is_recoverable());

    // The round stays in flight
    assert_eq!(pool.round_in_flight(), Some(1));
    assert!(matches!(
        pool.dispatch_round(vec![Duration::ZERO; 3]),
        Err(PoolError::RoundAlreadyInFlight { round: 1 })
    ));

    let output = pool.await_round_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(output.round, 1);
    assert_eq!(output.completed, 3);

    pool.shutdown(vec![Duration::ZERO; 3]).unwrap();
}

#[test]
fn test_configured_round_timeout_bounds_await() {
    logging::init_test();

    let config = RoundPoolConfig::with_pool_size(2).round_timeout(Duration::from_millis(20));
    let mut pool = RoundPool::with_config(config, SleepWork).unwrap();

    pool.dispatch_round(vec![Duration::from_millis(300), Duration::ZERO])
        .unwrap();
    assert!(matches!(
        pool.await_round(),
        Err(PoolError::RoundTimeout { round: 1, .. })
    ));

    pool.abort().unwrap();
}

#[test]
fn test_fast_round_beats_its_timeout() {
    logging::init_test();

    let config = RoundPoolConfig::with_pool_size(4).round_timeout(Duration::from_secs(5));
    let mut pool = RoundPool::with_config(config, SleepWork).unwrap();

    for _ in 0..5 {
        let output = pool.run_round(vec![Duration::ZERO; 4]).unwrap();
        assert_eq!(output.completed, 4);
    }

    pool.shutdown(vec![Duration::ZERO; 4]).unwrap();
}
