//! Bounded in-memory message log.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::LogEntry;

/// Default number of entries kept before the oldest are evicted.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Append-only, insertion-ordered log with a fixed capacity.
///
/// Once full, each append evicts the oldest entry.
#[derive(Debug)]
pub struct MessageLog {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a log holding at most `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, evicting the oldest one if the log is full.
    pub fn append(&self, entry: LogEntry) {
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Entries whose `type` equals `kind`, oldest first.
    pub fn entries_of(&self, kind: &str) -> Vec<LogEntry> {
        self.lock()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}
