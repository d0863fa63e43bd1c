//! Event logger for recording consumed lock transitions
//!
//! The checker thread hands every event it drains to this logger, which
//! forwards it over a channel to a background writer thread. Entries are
//! serialized as one JSON object per line so the file can be tailed or
//! post-processed while the program is still running. `flush` blocks until
//! the writer has synced everything received so far.

use crate::core::types::{Event, EventKind, LockId, ThreadId};
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread;
use std::time::Duration;

/// Structure for a single log entry representing one lock transition
#[derive(Debug, Serialize, Clone)]
pub struct LogEntry {
    /// Thread that performed the action
    pub thread_id: ThreadId,
    /// Lock that was involved (0 for exit notices)
    pub lock_id: LockId,
    /// Type of event that occurred
    pub event: EventKind,
    /// Absolute timestamp of when the event was consumed (seconds since Unix Epoch)
    pub timestamp: f64,
}

/// Commands for controlling the async logger thread
#[derive(Debug)]
enum LoggerCommand {
    /// Write a log entry to the file
    LogEntry(LogEntry),
    /// Flush all pending entries to disk and signal completion
    Flush(Sender<()>),
}

/// Asynchronous JSONL event logger with a background writer thread
pub struct EventLogger {
    /// Channel sender for async communication with the writer thread
    sender: Sender<LoggerCommand>,
    /// Flag indicating if a flush operation is in progress
    flushing: Arc<AtomicBool>,
}

impl EventLogger {
    /// Create a new logger that writes to the specified file asynchronously
    ///
    /// # Arguments
    /// * `path` - Path to the log file. If the filename contains "{timestamp}",
    ///   it will be replaced with the current timestamp.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The directory containing the log file could not be created
    /// - The log file could not be opened for writing
    /// - The writer thread could not be spawned
    pub fn with_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();

        // Create directory if needed
        if let Some(parent) = path_buf.parent() {
            if parent.to_string_lossy() != "" && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Replace timestamp placeholder if present
        #[allow(clippy::literal_string_with_formatting_args)]
        let file_path = if path_buf.to_string_lossy().contains("{timestamp}") {
            let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
            PathBuf::from(
                path_buf
                    .to_string_lossy()
                    .replace("{timestamp}", &timestamp.to_string()),
            )
        } else {
            path_buf
        };

        let (tx, rx) = channel::<LoggerCommand>();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&file_path)?;

        let flushing = Arc::new(AtomicBool::new(false));
        let flushing_clone = Arc::clone(&flushing);

        thread::Builder::new()
            .name("gridlock-log".into())
            .spawn(move || writer_thread(file, rx, flushing_clone))?;

        Ok(EventLogger {
            sender: tx,
            flushing,
        })
    }

    /// Record a consumed event
    ///
    /// Non-blocking; the entry is sent to the writer thread and the call
    /// never fails even if the channel is closed.
    pub fn log_event(&self, ev: &Event) {
        let now = Utc::now();
        let timestamp = now.timestamp() as f64 + now.timestamp_subsec_micros() as f64 / 1_000_000.0;

        let entry = LogEntry {
            thread_id: ev.thread.tid,
            lock_id: ev.lock.mid,
            event: ev.kind,
            timestamp,
        };

        if let Err(e) = self.sender.send(LoggerCommand::LogEntry(entry)) {
            eprintln!("Failed to send log entry: {:?}", e);
        }
    }

    /// Force flush all pending log entries to disk
    ///
    /// Blocks until the writer thread confirms the flush.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The flush request could not be sent to the writer thread
    /// - The flush confirmation was not received in time
    pub fn flush(&self) -> Result<()> {
        // CAS prevents multiple simultaneous flushes
        let already_flushing = self
            .flushing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err();

        if already_flushing {
            return Ok(());
        }

        let result = (|| {
            let (flush_tx, flush_rx) = channel();
            self.sender.send(LoggerCommand::Flush(flush_tx))?;

            match flush_rx.recv_timeout(Duration::from_secs(10)) {
                Ok(_) => Ok(()),
                Err(_) => Err(anyhow::anyhow!("Flush operation timed out")),
            }
        })();

        self.flushing.store(false, Ordering::SeqCst);
        result
    }
}

/// Writer thread: receives entries and appends them to the file
fn writer_thread(file: std::fs::File, rx: Receiver<LoggerCommand>, flushing: Arc<AtomicBool>) {
    let mut writer = BufWriter::new(file);

    // Loop until the channel is closed
    while let Ok(cmd) = rx.recv() {
        match cmd {
            LoggerCommand::LogEntry(entry) => {
                if let Ok(json) = serde_json::to_string(&entry) {
                    if let Err(e) = writeln!(writer, "{}", json).and_then(|_| writer.flush()) {
                        eprintln!("Logger write error: {:?}", e);
                    }
                }
            }
            LoggerCommand::Flush(responder) => {
                flushing.store(true, Ordering::Release);
                if let Err(e) = writer.flush() {
                    eprintln!("Logger flush error: {:?}", e);
                }
                flushing.store(false, Ordering::Release);
                let _ = responder.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{LockInfo, ThreadInfo};
    use tempfile::TempDir;

    fn event(kind: EventKind, tid: ThreadId, mid: LockId) -> Event {
        Event {
            kind,
            thread: ThreadInfo::new(tid),
            lock: LockInfo { mid },
        }
    }

    #[test]
    fn test_basic_logging() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("basic.log");

        let logger = EventLogger::with_file(&log_path).unwrap();

        logger.log_event(&event(EventKind::Wait, 1, 10));
        logger.log_event(&event(EventKind::Hold, 1, 10));
        logger.log_event(&event(EventKind::Release, 1, 10));

        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("\"thread_id\":1"));
        assert!(lines[0].contains("\"event\":\"Wait\""));
        assert!(lines[2].contains("\"event\":\"Release\""));
    }

    #[test]
    fn test_flush_idempotence() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("flush_test.log");

        let logger = EventLogger::with_file(&log_path).unwrap();

        for i in 0..10 {
            logger.log_event(&event(EventKind::Wait, i, 42));
        }

        // Multiple flushes should not cause issues
        logger.flush().unwrap();
        logger.flush().unwrap();
        logger.flush().unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents.lines().count(), 10);
    }
}
