use crate::core::config::{DEPTH_BACKTRACE, NAME_LEN};
use serde::{Deserialize, Serialize};

/// Thread & Lock identifier types
pub type ThreadId = usize;
pub type LockId = usize;

/// Runtime verbosity of the diagnostic output, matching the classic
/// 1=error .. 4=debug numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

/// A single lock transition observed at a producer thread
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventKind {
    /// Thread is about to block on a lock
    Wait,
    /// Thread successfully acquired a lock
    Hold,
    /// Thread released a lock
    Release,
    /// Thread is exiting; its queue slot and vertex may be reclaimed
    Exit,
}

/// Identity of the thread that produced an event.
///
/// The name is a fixed NUL-padded byte array and the backtrace a fixed-depth
/// array of opaque frame words, so the whole record stays `Copy` and can be
/// memcpy'd through the event ring.
#[derive(Debug, Clone, Copy)]
pub struct ThreadInfo {
    pub tid: ThreadId,
    pub name: [u8; NAME_LEN],
    pub backtrace: [usize; DEPTH_BACKTRACE],
}

impl ThreadInfo {
    pub(crate) fn new(tid: ThreadId) -> Self {
        ThreadInfo {
            tid,
            name: [0; NAME_LEN],
            backtrace: [0; DEPTH_BACKTRACE],
        }
    }

    /// Copy `name` into the fixed buffer, truncating at a char boundary.
    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = [0; NAME_LEN];
        let mut end = name.len().min(NAME_LEN);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        self.name[..end].copy_from_slice(&name.as_bytes()[..end]);
    }

    /// The stored name up to the first NUL.
    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(NAME_LEN);
        std::str::from_utf8(&self.name[..len]).unwrap_or("?")
    }
}

/// Identity of the lock an event refers to
#[derive(Debug, Clone, Copy)]
pub struct LockInfo {
    pub mid: LockId,
}

/// Value describing a single lock transition; value-copied into the
/// per-thread event ring.
#[derive(Debug, Clone, Copy)]
pub struct Event {
    pub kind: EventKind,
    pub thread: ThreadInfo,
    pub lock: LockInfo,
}

/// Represents the result of a deadlock detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlockInfo {
    /// Report code: 1001 for a self-lock (SCC of size 2), 1231 otherwise
    pub code: u32,
    /// Number of vertices (threads + locks) in the detected cycle
    pub scc_size: usize,
    /// List of threads involved in the deadlock cycle
    pub thread_cycle: Vec<ThreadId>,
    /// Map of threads to locks they're waiting for
    pub thread_waiting_for_locks: Vec<(ThreadId, LockId)>,
    /// Timestamp when the deadlock was detected
    pub timestamp: String,
}

/// Counters exposed to the host for monitoring
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Stats {
    /// Events lost to full rings since startup
    pub events_dropped: u64,
    /// Graph repairs applied while recovering from event loss
    pub repairs: u64,
    /// Threads currently blocked waiting on a lock (last tick's view)
    pub pending_requests: usize,
    /// Threads that have registered an event queue
    pub monitored_threads: usize,
    /// Cycle reports emitted since startup
    pub reports_emitted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_roundtrip_and_truncation() {
        let mut info = ThreadInfo::new(7);
        info.set_name("worker-1");
        assert_eq!(info.name_str(), "worker-1");

        info.set_name("a-very-long-thread-name-indeed");
        assert_eq!(info.name_str().len(), NAME_LEN);
        assert_eq!(info.name_str(), "a-very-long-thre");
    }

    #[test]
    fn name_truncates_on_char_boundary() {
        let mut info = ThreadInfo::new(1);
        // 16th byte falls in the middle of the multi-byte 'é'
        info.set_name("aaaaaaaaaaaaaaaé");
        assert_eq!(info.name_str(), "aaaaaaaaaaaaaaa");
    }
}
