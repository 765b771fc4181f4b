//! Bounded buffer of script log records.

use std::collections::VecDeque;

use super::{LogLevel, LogRecord};

/// Keeps the most recent `max_size` records, evicting the oldest first.
#[derive(Debug)]
pub struct LogRingBuffer {
    buffer: VecDeque<LogRecord>,
    max_size: usize,
}

impl LogRingBuffer {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            buffer: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, record: LogRecord) {
        if self.buffer.len() >= self.max_size {
            self.buffer.pop_front();
        }
        self.buffer.push_back(record);
    }

    /// The last `count` records, oldest first.
    pub fn recent(&self, count: usize) -> Vec<LogRecord> {
        let start = self.buffer.len().saturating_sub(count);
        self.buffer.iter().skip(start).cloned().collect()
    }

    pub fn all(&self) -> Vec<LogRecord> {
        self.buffer.iter().cloned().collect()
    }

    pub fn by_level(&self, level: LogLevel) -> Vec<LogRecord> {
        self.buffer.iter().filter(|record| record.level == level).cloned().collect()
    }

    /// Removes and returns every record, for hand-off to a shipper.
    pub fn drain(&mut self) -> Vec<LogRecord> {
        self.buffer.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl Default for LogRingBuffer {
    fn default() -> Self {
        Self::new(500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(level: LogLevel, message: &str) -> LogRecord {
        LogRecord::new(level, "script", message)
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut buffer = LogRingBuffer::new(2);
        buffer.push(record(LogLevel::Info, "one"));
        buffer.push(record(LogLevel::Info, "two"));
        buffer.push(record(LogLevel::Warn, "three"));

        let messages: Vec<String> = buffer.all().into_iter().map(|record| record.message).collect();
        assert_eq!(messages, vec!["two", "three"]);
    }

    #[test]
    fn recent_and_level_filters() {
        let mut buffer = LogRingBuffer::new(10);
        buffer.push(record(LogLevel::Debug, "a"));
        buffer.push(record(LogLevel::Error, "b"));
        buffer.push(record(LogLevel::Debug, "c"));

        assert_eq!(buffer.recent(2).len(), 2);
        assert_eq!(buffer.recent(2)[0].message, "b");
        assert_eq!(buffer.recent(99).len(), 3);
        assert_eq!(buffer.by_level(LogLevel::Debug).len(), 2);
    }

    #[test]
    fn drain_empties_the_buffer() {
        let mut buffer = LogRingBuffer::new(4);
        buffer.push(record(LogLevel::Info, "x"));
        assert_eq!(buffer.drain().len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut buffer = LogRingBuffer::new(0);
        buffer.push(record(LogLevel::Info, "kept"));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.max_size(), 1);
    }
}
