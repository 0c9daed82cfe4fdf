// Pool configuration and how it reaches the worker threads

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lockstep::config::DEFAULT_THREAD_NAME_PREFIX;
use lockstep::{logging, work_fn, PoolError, RoundPool, RoundPoolConfig};

#[test]
fn test_default_config() {
    let config = RoundPoolConfig::default();

    assert_eq!(config.pool_size, num_cpus::get());
    assert_eq!(config.thread_name_prefix, DEFAULT_THREAD_NAME_PREFIX);
    assert_eq!(config.thread_stack_size, None);
    assert_eq!(config.round_timeout, None);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_builders() {
    let config = RoundPoolConfig::with_pool_size(6)
        .thread_name_prefix("accel-")
        .thread_stack_size(256 * 1024)
        .round_timeout(Duration::from_millis(750));

    assert_eq!(config.pool_size, 6);
    assert_eq!(config.thread_name(0), "accel-1");
    assert_eq!(config.thread_name(5), "accel-6");
    assert_eq!(config.thread_stack_size, Some(256 * 1024));
    assert_eq!(config.round_timeout, Some(Duration::from_millis(750)));
}

#[test]
fn test_zero_pool_size_fails_validation() {
    let config = RoundPoolConfig::with_pool_size(0);
    assert!(matches!(config.validate(), Err(PoolError::InvalidPoolSize(0))));
}

#[test]
fn test_worker_threads_are_named_from_config() {
    logging::init_test();

    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&names);

    let config = RoundPoolConfig::with_pool_size(3)
        .thread_name_prefix("named-")
        .thread_stack_size(512 * 1024);
    let mut pool = RoundPool::with_config(
        config,
        work_fn(move |_, _: &mut ()| {
            let name = std::thread::current().name().map(str::to_string);
            sink.lock().unwrap().push(name);
            Ok(())
        }),
    )
    .unwrap();

    pool.run_round(vec![(); 3]).unwrap();
    pool.abort().unwrap();

    let mut names: Vec<_> = names.lock().unwrap().iter().flatten().cloned().collect();
    names.sort();
    assert_eq!(names, vec!["named-1", "named-2", "named-3"]);
}

#[test]
fn test_default_pool_uses_every_cpu() {
    logging::init_test();

    let pool = RoundPool::new(work_fn(|_, _: &mut u8| Ok(()))).unwrap();
    assert_eq!(pool.size(), num_cpus::get());
    assert_eq!(pool.config().pool_size, pool.size());
    pool.abort().unwrap();
}
