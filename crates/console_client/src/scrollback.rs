//! Bounded scrollback storage.
//!
//! The receive path appends while render paths take snapshots, possibly from
//! other threads. Both go through one `RwLock`, so a snapshot never observes a
//! half-applied append and eviction happens inside the same critical section.

use crate::log_line::LogLine;
use parking_lot::RwLock;
use std::collections::VecDeque;

/// Default number of retained lines.
pub const DEFAULT_SCROLLBACK_CAPACITY: usize = 500;

#[derive(Debug)]
struct Inner {
    lines: VecDeque<LogLine>,
    total_appended: u64,
}

/// Ordered, capacity-bounded sequence of display lines with FIFO eviction.
#[derive(Debug)]
pub struct ScrollbackBuffer {
    capacity: usize,
    inner: RwLock<Inner>,
}

impl ScrollbackBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(Inner {
                lines: VecDeque::with_capacity(capacity),
                total_appended: 0,
            }),
        }
    }

    /// Append a line, evicting the oldest ones while over capacity.
    ///
    /// Returns how many lines were evicted.
    pub fn append(&self, line: LogLine) -> usize {
        let mut inner = self.inner.write();
        inner.lines.push_back(line);
        inner.total_appended += 1;

        let mut evicted = 0;
        while inner.lines.len() > self.capacity {
            inner.lines.pop_front();
            evicted += 1;
        }
        evicted
    }

    /// Copy of the retained lines, oldest first.
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.inner.read().lines.iter().cloned().collect()
    }

    /// The newest `count` lines, oldest first.
    pub fn tail(&self, count: usize) -> Vec<LogLine> {
        let inner = self.inner.read();
        let skip = inner.lines.len().saturating_sub(count);
        inner.lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Lines appended over the buffer's lifetime, including evicted ones.
    pub fn total_appended(&self) -> u64 {
        self.inner.read().total_appended
    }
}

impl Default for ScrollbackBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLLBACK_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_line::LineClass;
    use std::sync::Arc;

    fn texts(lines: &[LogLine]) -> Vec<String> {
        lines.iter().map(|l| l.text().to_string()).collect()
    }

    #[test]
    fn test_default_capacity() {
        assert_eq!(ScrollbackBuffer::default().capacity(), 500);
    }

    #[test]
    fn test_keeps_most_recent_lines_in_order() {
        for (capacity, appends) in [(1usize, 5usize), (3, 3), (3, 4), (5, 17), (500, 1234)] {
            let buffer = ScrollbackBuffer::new(capacity);
            for i in 0..appends {
                buffer.append(LogLine::new(LineClass::Info, i.to_string()));
            }

            let snapshot = buffer.snapshot();
            assert_eq!(snapshot.len(), capacity.min(appends));
            let expected: Vec<String> = (appends.saturating_sub(capacity)..appends)
                .map(|i| i.to_string())
                .collect();
            assert_eq!(texts(&snapshot), expected);
            assert_eq!(buffer.total_appended(), appends as u64);
        }
    }

    #[test]
    fn test_append_reports_evictions() {
        let buffer = ScrollbackBuffer::new(2);
        assert_eq!(buffer.append(LogLine::raw("a")), 0);
        assert_eq!(buffer.append(LogLine::raw("b")), 0);
        assert_eq!(buffer.append(LogLine::raw("c")), 1);
        assert_eq!(texts(&buffer.snapshot()), vec!["b", "c"]);
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let buffer = ScrollbackBuffer::new(4);
        buffer.append(LogLine::raw("one"));
        let first = buffer.snapshot();
        let second = buffer.snapshot();
        assert_eq!(first, second);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_tail() {
        let buffer = ScrollbackBuffer::new(10);
        for text in ["a", "b", "c", "d"] {
            buffer.append(LogLine::raw(text));
        }
        assert_eq!(texts(&buffer.tail(2)), vec!["c", "d"]);
        assert_eq!(texts(&buffer.tail(10)), vec!["a", "b", "c", "d"]);
        assert!(buffer.tail(0).is_empty());
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let buffer = ScrollbackBuffer::new(0);
        assert_eq!(buffer.append(LogLine::raw("gone")), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_concurrent_readers_never_exceed_capacity() {
        let buffer = Arc::new(ScrollbackBuffer::new(64));
        let writer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for i in 0..10_000u32 {
                    buffer.append(LogLine::raw(i.to_string()));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = buffer.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = buffer.snapshot();
                        assert!(snapshot.len() <= 64);
                        // every snapshot is a contiguous, increasing run
                        let numbers: Vec<u32> =
                            snapshot.iter().map(|l| l.text().parse().unwrap()).collect();
                        assert!(numbers.windows(2).all(|w| w[1] == w[0] + 1));
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(buffer.len(), 64);
        assert_eq!(buffer.snapshot().last().unwrap().text(), "9999");
    }
}
