// Core types
pub mod types;
pub use types::*;

// Configuration
pub mod config;
pub use config::DetectorConfig;

// Building blocks: pools, rings, locks
pub mod pool;
pub mod ring;
pub mod spinlock;

// Logging functionality
pub mod logger;
pub use logger::set_log_level;

// Graph implementation
pub mod graph;

// Deadlock detector
pub mod detector;
pub use detector::{shutdown, stats};

// Producer side: thread-local dispatcher and the probe functions
pub mod dispatcher;

// Lock filter
pub mod filter;

// Tracked mutex
pub mod tracked_mutex;
pub use tracked_mutex::{TrackedGuard, TrackedMutex};

use crate::core::dispatcher::CaptureHook;
use crate::core::logger::EventLogger;
use anyhow::{Context, Result};
use std::time::Duration;

/// Gridlock configuration builder
///
/// Collects everything the detector needs before it starts: verbosity,
/// tick period, capacities, the deadlock callback, the optional event log
/// and the optional backtrace capture hook. `start` brings up the
/// background threads; after that the configuration is frozen for the
/// lifetime of the process.
pub struct Gridlock {
    config: DetectorConfig,
    log_level: LogLevel,
    log_path: Option<String>,
    callback: Option<Box<dyn Fn(DeadlockInfo) + Send + Sync + 'static>>,
    capture: Option<CaptureHook>,
}

impl Default for Gridlock {
    fn default() -> Self {
        Self::new()
    }
}

impl Gridlock {
    /// Create a new builder with default settings
    ///
    /// By default:
    /// - Diagnostics at warn level
    /// - 200 ms tick period, 512 threads, 512 locks, 256-event rings
    /// - No callback (cycle reports still go to stderr)
    /// - No event log, no capture hook
    pub fn new() -> Self {
        Gridlock {
            config: DetectorConfig::default(),
            log_level: LogLevel::Warn,
            log_path: None,
            callback: None,
            capture: None,
        }
    }

    /// Set the diagnostic verbosity
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Set the checker tick period (event drain + cycle scan)
    pub fn period(mut self, period: Duration) -> Self {
        self.config.period = period;
        self
    }

    /// Size the detector for at most `threads` monitored threads and
    /// `locks` monitored locks
    pub fn capacities(mut self, threads: usize, locks: usize) -> Self {
        self.config.max_threads = threads;
        self.config.max_locks = locks;
        self
    }

    /// Set the per-thread event ring capacity (rounded down to a power of
    /// two)
    pub fn ring_capacity(mut self, capacity: usize) -> Self {
        self.config.ring_capacity = capacity;
        self
    }

    /// Set a callback to be invoked (from a dedicated thread) for every
    /// cycle report
    pub fn on_deadlock<F>(mut self, callback: F) -> Self
    where
        F: Fn(DeadlockInfo) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Record every consumed event to a JSONL file
    ///
    /// If the path contains "{timestamp}", it is replaced with the current
    /// timestamp.
    pub fn with_event_log<P: AsRef<std::path::Path>>(mut self, path: P) -> Self {
        self.log_path = Some(path.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Install a backtrace capture hook
    ///
    /// The hook fills a fixed-depth frame buffer at every WAIT and RELEASE;
    /// without one, reports show zeroed frames.
    pub fn capture_hook(mut self, hook: CaptureHook) -> Self {
        self.capture = Some(hook);
        self
    }

    /// Initialize the detector with the configured settings
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the event logger
    /// cannot be created, or the detector is already running.
    pub fn start(self) -> Result<()> {
        logger::set_log_level(self.log_level);

        let event_logger = match self.log_path {
            Some(path) => {
                Some(EventLogger::with_file(path).context("Failed to initialize event logger")?)
            }
            None => None,
        };

        detector::init_detector(self.config, self.callback, event_logger, self.capture)
    }
}

/// Initialize the detector with defaults and the given verbosity.
///
/// The one-call form of [`Gridlock::start`] for hosts that only want the
/// stderr reports.
pub fn init(level: LogLevel) -> Result<()> {
    Gridlock::new().log_level(level).start()
}
