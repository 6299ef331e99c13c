//! Bounded line history shared between the pump and test code.
//!
//! The reader thread never blocks on `put`: once the buffer is full the
//! oldest line is dropped. Consumers block on `get` with an optional timeout.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{ConsoleError, Result};

/// Default history size, in lines.
pub const DEFAULT_CAPACITY: usize = 400;

/// Thread-safe FIFO with eviction on overflow.
///
/// A capacity of 0 means unbounded.
#[derive(Debug)]
pub struct LineBuffer<T> {
    queue: Mutex<VecDeque<T>>,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> LineBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an item, evicting the oldest one if the buffer is full.
    pub fn put(&self, item: T) {
        let mut queue = self.lock();
        if self.capacity > 0 && queue.len() >= self.capacity {
            queue.pop_front();
        }
        queue.push_back(item);
        self.not_empty.notify_one();
    }

    /// Remove and return the oldest item.
    ///
    /// - `block == false`: fails with [`ConsoleError::Empty`] right away when
    ///   nothing is buffered.
    /// - `block == true`, `timeout == None`: waits until an item arrives.
    /// - `block == true`, `timeout == Some(t)`: waits at most `t`. A `t` too
    ///   large to add to `Instant::now()` waits like `None`.
    pub fn get(&self, block: bool, timeout: Option<Duration>) -> Result<T> {
        let mut queue = self.lock();

        if !block {
            return queue.pop_front().ok_or(ConsoleError::Empty);
        }

        let deadline = timeout.and_then(deadline_after);
        while queue.is_empty() {
            queue = match deadline {
                None => self
                    .not_empty
                    .wait(queue)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(ConsoleError::Empty);
                    }
                    self.not_empty
                        .wait_timeout(queue, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }

        queue.pop_front().ok_or(ConsoleError::Empty)
    }

    /// Drop everything currently buffered.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panicking consumer must not wedge the pump, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `now + timeout`, or `None` when that instant is not representable.
pub(crate) fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

impl<T> Default for LineBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn drain(buffer: &LineBuffer<u32>) -> Vec<u32> {
        let mut out = Vec::new();
        while let Ok(item) = buffer.get(false, None) {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_keeps_last_items_in_order() {
        for (capacity, puts) in [(3usize, 10u32), (5, 2), (4, 4), (1, 7)] {
            let buffer = LineBuffer::new(capacity);
            for i in 0..puts {
                buffer.put(i);
            }
            let kept = capacity.min(puts as usize) as u32;
            let expected: Vec<u32> = (puts - kept..puts).collect();
            assert_eq!(drain(&buffer), expected, "capacity={capacity} puts={puts}");
        }
    }

    #[test]
    fn test_zero_capacity_is_unbounded() {
        let buffer = LineBuffer::new(0);
        for i in 0..1000 {
            buffer.put(i);
        }
        assert_eq!(buffer.len(), 1000);
        assert_eq!(buffer.get(false, None).unwrap(), 0);
    }

    #[test]
    fn test_nonblocking_get_on_empty_fails_immediately() {
        let buffer: LineBuffer<u32> = LineBuffer::new(4);
        let start = Instant::now();
        assert!(matches!(buffer.get(false, None), Err(ConsoleError::Empty)));
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn test_blocking_get_times_out() {
        let buffer: LineBuffer<u32> = LineBuffer::new(4);
        let start = Instant::now();
        let result = buffer.get(true, Some(Duration::from_millis(100)));
        assert!(matches!(result, Err(ConsoleError::Empty)));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_blocking_get_wakes_when_item_arrives() {
        let buffer = Arc::new(LineBuffer::new(4));
        let producer = Arc::clone(&buffer);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            producer.put(42u32);
        });

        let start = Instant::now();
        let item = buffer.get(true, Some(Duration::from_secs(5))).unwrap();
        let waited = start.elapsed();
        handle.join().unwrap();

        assert_eq!(item, 42);
        assert!(waited >= Duration::from_millis(90));
        assert!(waited < Duration::from_secs(2), "waited {waited:?}");
    }

    #[test]
    fn test_blocking_get_without_timeout() {
        let buffer = Arc::new(LineBuffer::new(0));
        let producer = Arc::clone(&buffer);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            producer.put(7u32);
        });
        assert_eq!(buffer.get(true, None).unwrap(), 7);
        handle.join().unwrap();
    }

    #[test]
    fn test_huge_timeout_waits_without_deadline() {
        let buffer = Arc::new(LineBuffer::new(4));
        buffer.put(1u32);
        assert_eq!(buffer.get(true, Some(Duration::MAX)).unwrap(), 1);

        let producer = Arc::clone(&buffer);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            producer.put(2u32);
        });
        assert_eq!(buffer.get(true, Some(Duration::MAX)).unwrap(), 2);
        handle.join().unwrap();
        assert!(deadline_after(Duration::MAX).is_none());
    }

    #[test]
    fn test_clear() {
        let buffer = LineBuffer::new(4);
        buffer.put(1u32);
        buffer.put(2);
        buffer.clear();
        assert!(buffer.is_empty());
        buffer.put(3);
        assert_eq!(drain(&buffer), vec![3]);
    }
}
