// Logging for Lockstep
//
// Round pools log through the `tracing` ecosystem. This module owns the one-time
// subscriber setup and a few macros that keep pool, worker and round events
// structured the same way everywhere.
//
// # Usage Examples
//
// ## Basic Initialization
//
// ```rust
// use lockstep::logging;
//
// // INFO level, human-readable console output
// logging::init_default();
//
// // Or a custom configuration
// let config = logging::LogConfig {
//     level: tracing::Level::DEBUG,
//     json_format: false,
//     ..Default::default()
// };
// logging::init(config);
// ```
//
// ## Environment Presets
//
// ```rust
// use lockstep::logging;
//
// logging::init_development(); // DEBUG, round/worker traces, file and line
// logging::init_production();  // INFO, JSON, no source locations
// logging::init_test();        // WARN only, compact
// ```
//
// ## File Logging
//
// ```rust
// use lockstep::logging;
//
// logging::init_with_file(logging::LogConfig::default(), "/var/log/lockstep.log").unwrap();
// ```
//
// ## Event Macros
//
// ```rust
// use lockstep::{log_round, log_worker, worker_span};
//
// let span = worker_span!(3);
// let _guard = span.enter();
// log_worker!(3, "processing", round = 7);
// log_round!(7, "complete", arrived = 4);
// ```
//
// Environment filters from `RUST_LOG` are always honored on top of the
// configured level.

use std::io;
use std::sync::Once;
use tracing::{Level, Subscriber};
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Configuration for the Lockstep logging system
///
/// # Examples
///
/// ```rust
/// use lockstep::logging::LogConfig;
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     json_format: true,
///     show_file_line: false,
///     show_thread_info: true,
///     show_time: true,
///     target_filters: Some("lockstep=debug,lockstep::barrier=trace".to_string()),
/// };
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id; worker threads are named after their worker
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Only the first initialization wins
static INIT: Once = Once::new();

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.level.into());

    if let Some(filters) = &config.target_filters {
        for filter in filters.split(',') {
            match filter.trim().parse() {
                Ok(directive) => env_filter = env_filter.add_directive(directive),
                Err(err) => eprintln!("Ignoring log filter '{}': {}", filter, err),
            }
        }
    }

    env_filter
}

/// Initialize the logging system with the given configuration
///
/// Installs the global tracing subscriber. Safe to call more than once; only
/// the first call takes effect.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let registry = tracing_subscriber::registry().with(env_filter(&config));

        let layer = if config.json_format {
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_thread_names(config.show_thread_info)
                .boxed()
        } else {
            let fmt_layer = fmt::layer()
                .with_ansi(atty::is(atty::Stream::Stdout))
                .with_file(config.show_file_line)
                .with_line_number(config.show_file_line)
                .with_thread_names(config.show_thread_info)
                .with_thread_ids(config.show_thread_info);

            if config.show_time {
                fmt_layer.boxed()
            } else {
                fmt_layer.without_time().boxed()
            }
        };

        set_global_subscriber(registry.with(layer));
    });
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Open `path` for appending, creating it if needed.
pub fn file_writer(path: &str) -> io::Result<Box<dyn io::Write + Send + Sync + 'static>> {
    use std::fs::OpenOptions;

    let file = OpenOptions::new().create(true).append(true).open(path)?;

    Ok(Box::new(file))
}

/// Initialize logging with both console and file output
///
/// The file is checked up front so a bad path is reported to the caller
/// instead of silently falling back to stderr. File output is always plain
/// text with source locations and thread names.
pub fn init_with_file(config: LogConfig, log_file: &str) -> Result<(), io::Error> {
    file_writer(log_file)?;

    INIT.call_once(|| {
        let console_layer = fmt::layer()
            .with_ansi(atty::is(atty::Stream::Stdout))
            .with_file(config.show_file_line)
            .with_line_number(config.show_file_line)
            .with_thread_names(config.show_thread_info)
            .with_thread_ids(config.show_thread_info);

        let log_file_path = log_file.to_string();
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(move || match file_writer(&log_file_path) {
                Ok(writer) => writer,
                Err(_) => Box::new(std::io::stderr()),
            })
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer)
            .with(file_layer);

        set_global_subscriber(subscriber);
    });

    Ok(())
}

/// INFO level, human-readable console output.
pub fn init_default() {
    init(LogConfig::default());
}

/// DEBUG for the crate, TRACE for barrier arrivals, with source locations and
/// thread names so interleaved worker output stays readable.
pub fn init_development() {
    init(development_config());
}

pub fn init_development_with_file(path: &str) -> Result<(), io::Error> {
    init_with_file(development_config(), path)
}

fn development_config() -> LogConfig {
    LogConfig {
        level: Level::DEBUG,
        json_format: false,
        show_file_line: true,
        show_thread_info: true,
        show_time: true,
        target_filters: Some("lockstep=debug,lockstep::barrier=trace".to_string()),
    }
}

/// JSON output at INFO, no file/line information.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// Warnings and errors only, compact output for test runs.
///
/// ```rust
/// #[test]
/// fn my_test() {
///     lockstep::logging::init_test();
///     // ...
/// }
/// ```
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

/// Span covering everything a pool does
///
/// ```rust
/// use lockstep::pool_span;
///
/// let span = pool_span!("5f0c7c1e-0000-4000-8000-000000000000", size = 4);
/// let _guard = span.enter();
/// ```
#[macro_export]
macro_rules! pool_span {
    ($pool_id:expr) => {
        tracing::info_span!("pool", id = %$pool_id)
    };
    ($pool_id:expr, $($fields:tt)*) => {
        tracing::info_span!("pool", id = %$pool_id, $($fields)*)
    };
}

/// Span for one worker thread, keyed by worker number
#[macro_export]
macro_rules! worker_span {
    ($worker:expr) => {
        tracing::debug_span!("worker", worker = %$worker)
    };
    ($worker:expr, $($fields:tt)*) => {
        tracing::debug_span!("worker", worker = %$worker, $($fields)*)
    };
}

/// Round lifecycle events (dispatched, complete, timed out)
#[macro_export]
macro_rules! log_round {
    ($round:expr, $event:expr) => {
        tracing::debug!(round = $round, event = $event);
    };
    ($round:expr, $event:expr, $($fields:tt)*) => {
        tracing::debug!(round = $round, event = $event, $($fields)*);
    };
}

/// Worker lifecycle and per-item events
#[macro_export]
macro_rules! log_worker {
    ($worker:expr, $event:expr) => {
        tracing::debug!(worker = %$worker, event = $event);
    };
    ($worker:expr, $event:expr, $($fields:tt)*) => {
        tracing::debug!(worker = %$worker, event = $event, $($fields)*);
    };
}

/// Error events
#[macro_export]
macro_rules! log_error {
    ($error:expr) => {
        tracing::error!(error = %$error);
    };
    ($error:expr, $($fields:tt)*) => {
        tracing::error!(error = %$error, $($fields)*);
    };
}

/// Dispatcher active on the calling thread.
///
/// Worker threads are started under this dispatcher so they log wherever the
/// thread that built the pool logs, including scoped test subscribers.
#[inline]
pub fn current_subscriber() -> tracing::Dispatch {
    tracing::dispatcher::get_default(|d| d.clone())
}
