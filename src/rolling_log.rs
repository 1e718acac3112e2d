//! Bounded, most-recent-first log.
//!
//! Backs the error log, the system event log and the conversation log. The
//! newest entry sits at the front; pushing beyond capacity evicts from the
//! back.

use std::collections::VecDeque;

// ---------------------------------------------------------------------------
// RollingLog
// ---------------------------------------------------------------------------

/// Fixed-capacity log that keeps the most recent `capacity` items.
#[derive(Debug, Clone)]
pub struct RollingLog<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RollingLog<T> {
    /// Create an empty log. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend an item, evicting the oldest one if the log is full.
    pub fn push(&mut self, item: T) {
        self.items.push_front(item);
        self.items.truncate(self.capacity);
    }

    /// Iterate newest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Keep only the items matching `keep`, preserving order.
    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&T) -> bool,
    {
        self.items.retain(keep);
    }

    /// Number of retained items, never more than [`capacity`](Self::capacity).
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing has been pushed or everything was retained away.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Maximum number of items kept; always at least 1.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> RollingLog<T> {
    /// Up to `limit` most recent items, newest first.
    pub fn list(&self, limit: usize) -> Vec<T> {
        self.items.iter().take(limit).cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
