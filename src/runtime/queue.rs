//! Bounded FIFO of accepted connections awaiting a worker.
//!
//! The accept loop pushes, workers pop. Admission never blocks: when the
//! queue is full `try_push` hands the item straight back and the caller is
//! expected to close it (drop newest on full).
//!
//! ## Wake-up
//!
//! Idle workers park on a condition variable instead of sleeping for a fixed
//! interval and re-checking. A push wakes exactly one parked worker, and
//! `close` wakes all of them. Admission and service semantics are the same as
//! with interval polling; only the wake latency goes away.
//!
//! The lock is held for O(1) deque operations only. Nothing in this module
//! performs I/O while holding it.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

struct State<T> {
    /// Ring buffer, preallocated to capacity so pushes never reallocate.
    items: VecDeque<T>,
    closed: bool,
}

/// Lock-guarded bounded queue shared between the acceptor and the workers.
pub struct ConnectionQueue<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    capacity: usize,
}

impl<T> ConnectionQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0, "queue capacity must be positive");
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
        }
    }

    // Every critical section leaves the deque consistent, so a panic in
    // another holder does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Append an item without blocking.
    ///
    /// Returns the new queue length, or gives the item back if the queue is
    /// full or closed.
    pub fn try_push(&self, item: T) -> Result<usize, T> {
        let mut state = self.lock();
        if state.closed || state.items.len() >= self.capacity {
            return Err(item);
        }
        state.items.push_back(item);
        let len = state.items.len();
        drop(state);

        self.available.notify_one();
        Ok(len)
    }

    /// Remove the oldest item, or `None` if the queue is empty right now.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Remove the oldest item, parking until one arrives.
    ///
    /// Returns `None` once the queue is closed and empty. Items still queued
    /// when the queue is closed remain poppable.
    pub fn pop_wait(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            // A wake-up that finds the deque empty lost the race to a
            // sibling; go back to waiting.
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Stop accepting pushes and wake every parked consumer.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Remove everything still queued, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.lock().items.drain(..).collect()
    }
}
