//! Bounded in-memory log ring.
//!
//! Keeps the most recent engine log lines for inspection endpoints while
//! forwarding every entry to `tracing` for the real logging pipeline.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;

use flowsync_core::types::Timestamp;

/// Ring capacity.
const DEFAULT_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: Timestamp,
}

/// Fixed-capacity ring of recent log entries.
pub struct LogBuffer {
    capacity: usize,
    entries: Mutex<VecDeque<LogEntry>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append an entry, evicting the oldest once at capacity. The entry is
    /// also forwarded to `tracing` at the matching level.
    pub fn push(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }

        let mut entries = self.entries.lock().expect("log buffer lock poisoned");
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogEntry {
            level,
            message,
            timestamp: chrono::Utc::now(),
        });
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let entries = self.entries.lock().expect("log buffer lock poisoned");
        entries.iter().rev().take(n).rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("log buffer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_entries_in_order() {
        let buf = LogBuffer::new(10);
        buf.push(LogLevel::Info, "one");
        buf.push(LogLevel::Warn, "two");

        let recent = buf.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "one");
        assert_eq!(recent[1].level, LogLevel::Warn);
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let buf = LogBuffer::new(3);
        for i in 0..5 {
            buf.push(LogLevel::Debug, format!("m{i}"));
        }

        assert_eq!(buf.len(), 3);
        let recent = buf.recent(10);
        assert_eq!(recent[0].message, "m2");
        assert_eq!(recent[2].message, "m4");
    }

    #[test]
    fn recent_limits_the_returned_window() {
        let buf = LogBuffer::new(10);
        for i in 0..6 {
            buf.push(LogLevel::Info, format!("m{i}"));
        }

        let recent = buf.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "m4");
        assert_eq!(recent[1].message, "m5");
    }
}
