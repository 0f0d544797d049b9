//! Bounded producer/consumer queue for command lists.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;

/// The queue was closed while a producer was pushing (or blocked to push).
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("command queue closed")]
pub struct QueueClosed;

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Thread-safe FIFO with a hard bound on pending items.
///
/// `push` exerts backpressure by blocking while the queue is full; `pop`
/// waits with a timeout so the single consumer can keep pacing its frame
/// loop on an empty queue. [`close`](Self::close) unblocks everyone for
/// shutdown — without it a producer blocked in `push` would deadlock.
pub struct Queue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> Queue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be non-zero");
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Appends to the tail, blocking while the queue holds `capacity`
    /// pending items. A full queue is backpressure, not an error; the only
    /// error is shutdown.
    pub fn push(&self, item: T) -> Result<(), QueueClosed> {
        let guard = self.lock();
        let mut inner = self
            .not_full
            .wait_while(guard, |inner| {
                inner.items.len() >= self.capacity && !inner.closed
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if inner.closed {
            return Err(QueueClosed);
        }
        inner.items.push_back(item);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the head item, or returns `None` once `timeout` elapses
    /// with the queue still empty (or the queue is closed and drained).
    pub fn pop(&self, timeout: Duration) -> Option<T> {
        let guard = self.lock();
        let (mut inner, _timed_out) = self
            .not_empty
            .wait_timeout_while(guard, timeout, |inner| {
                inner.items.is_empty() && !inner.closed
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let item = inner.items.pop_front();
        if item.is_some() {
            drop(inner);
            self.not_full.notify_one();
        }
        item
    }

    /// Marks the queue closed and wakes every blocked producer and the
    /// consumer. Items already queued can still be drained by `pop`.
    pub fn close(&self) {
        {
            let mut inner = self.lock();
            inner.closed = true;
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}
