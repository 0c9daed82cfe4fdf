use std::time::Duration;

use lockstep_api::errors::PoolError;

pub const DEFAULT_THREAD_NAME_PREFIX: &str = "lockstep-worker-";

/// Configuration for a `RoundPool`.
#[derive(Clone, Debug)]
pub struct RoundPoolConfig {
    /// Number of worker threads, fixed for the pool's lifetime.
    pub pool_size: usize,

    /// Prefix for worker thread names; the worker number is appended.
    pub thread_name_prefix: String,

    /// Stack size for worker threads. `None` uses the platform default.
    pub thread_stack_size: Option<usize>,

    /// Default bound for `await_round` and `await_round_async`. `None` waits
    /// indefinitely. The final round of `shutdown` is always awaited in full.
    pub round_timeout: Option<Duration>,
}

impl Default for RoundPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: num_cpus::get(),
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            thread_stack_size: None,
            round_timeout: None,
        }
    }
}

impl RoundPoolConfig {
    /// Default configuration with an explicit pool size.
    pub fn with_pool_size(pool_size: usize) -> Self {
        Self {
            pool_size,
            ..Default::default()
        }
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    pub fn round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = Some(timeout);
        self
    }

    /// Reject configurations a pool cannot be built from.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.pool_size == 0 {
            return Err(PoolError::InvalidPoolSize(self.pool_size));
        }
        Ok(())
    }

    /// Thread name for the worker at `index`.
    pub fn thread_name(&self, index: usize) -> String {
        format!("{}{}", self.thread_name_prefix, index + 1)
    }
}
