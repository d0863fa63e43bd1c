//! Logging for Gridlock
//!
//! Two concerns live here: leveled diagnostic output gated by a global
//! runtime level (1=error .. 4=debug, silent before init), and an optional
//! asynchronous event logger that records every consumed lock transition as
//! a line of JSON.

mod event_logger;

pub use event_logger::EventLogger;

use crate::core::types::LogLevel;
use std::sync::atomic::{AtomicU8, Ordering};

// 0 = silent; set once by the builder at startup.
static LOG_LEVEL: AtomicU8 = AtomicU8::new(0);

/// Set the diagnostic verbosity. Callable at any time.
pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub(crate) fn level_enabled(level: LogLevel) -> bool {
    LOG_LEVEL.load(Ordering::Relaxed) >= level as u8
}

macro_rules! diag_err {
    ($($arg:tt)*) => {
        if $crate::core::logger::level_enabled($crate::core::types::LogLevel::Error) {
            eprintln!("[gridlock:error] {}", format_args!($($arg)*));
        }
    };
}

macro_rules! diag_warn {
    ($($arg:tt)*) => {
        if $crate::core::logger::level_enabled($crate::core::types::LogLevel::Warn) {
            eprintln!("[gridlock:warn] {}", format_args!($($arg)*));
        }
    };
}

macro_rules! diag_info {
    ($($arg:tt)*) => {
        if $crate::core::logger::level_enabled($crate::core::types::LogLevel::Info) {
            eprintln!("[gridlock:info] {}", format_args!($($arg)*));
        }
    };
}

macro_rules! diag_dbg {
    ($($arg:tt)*) => {
        if $crate::core::logger::level_enabled($crate::core::types::LogLevel::Debug) {
            eprintln!("[gridlock:debug] {}", format_args!($($arg)*));
        }
    };
}

pub(crate) use diag_dbg;
pub(crate) use diag_err;
pub(crate) use diag_info;
pub(crate) use diag_warn;
