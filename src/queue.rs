//! Fixed-capacity blocking FIFO used between pipeline stages.
//!
//! Two counting semaphores bound the queue: `free` starts at the capacity
//! and `filled` at zero.  A producer takes a `free` permit before touching
//! the deque and hands a `filled` permit to consumers afterwards; consumers
//! do the reverse.  The mutex guarding the deque is held only for a single
//! push or pop.
//!
//! Waits are always bounded.  [`BoundedQueue::close`] additionally cuts
//! short every wait that could otherwise only end by timing out.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lock a mutex, recovering the guard if another thread panicked while
/// holding it.  Every critical section in this crate leaves the protected
/// value consistent, so poisoning carries no information.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Semaphore ────────────────────────────────────────────────────────────────

struct Permits {
    available: usize,
    closed:    bool,
}

struct Semaphore {
    state:   Mutex<Permits>,
    changed: Condvar,
}

impl Semaphore {
    fn new(permits: usize) -> Self {
        Self {
            state:   Mutex::new(Permits { available: permits, closed: false }),
            changed: Condvar::new(),
        }
    }

    /// Take one permit, waiting at most `timeout`.  A zero timeout never
    /// blocks, and neither does a closed semaphore with no permit left.
    fn acquire_timeout(&self, timeout: Duration) -> bool {
        let guard = lock(&self.state);
        let (mut state, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |s| s.available == 0 && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        if state.available == 0 {
            return false;
        }
        state.available -= 1;
        true
    }

    fn release(&self) {
        lock(&self.state).available += 1;
        self.changed.notify_one();
    }

    fn close(&self) {
        lock(&self.state).closed = true;
        self.changed.notify_all();
    }
}

// ── BoundedQueue ─────────────────────────────────────────────────────────────

/// Thread-safe FIFO holding at most `capacity` items.
///
/// Producers block while the queue is full and consumers while it is empty,
/// each for no longer than the timeout they pass in.
pub struct BoundedQueue<T> {
    items:    Mutex<VecDeque<T>>,
    free:     Semaphore,
    filled:   Semaphore,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Queue holding at most `capacity` items.  A capacity of 0 is raised
    /// to 1.  Storage grows on demand, so a large bound costs nothing until
    /// it is used.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items:  Mutex::new(VecDeque::new()),
            free:   Semaphore::new(capacity),
            filled: Semaphore::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `item`, waiting up to `timeout` for a free slot.
    ///
    /// On timeout the item is handed back so the caller can retry without
    /// copying it.
    pub fn try_enqueue(&self, item: T, timeout: Duration) -> Result<(), T> {
        if !self.free.acquire_timeout(timeout) {
            return Err(item);
        }
        lock(&self.items).push_back(item);
        self.filled.release();
        Ok(())
    }

    /// Remove the oldest item, waiting up to `timeout` for one to arrive.
    pub fn try_dequeue(&self, timeout: Duration) -> Option<T> {
        if !self.filled.acquire_timeout(timeout) {
            return None;
        }
        let item = lock(&self.items).pop_front();
        self.free.release();
        item
    }

    /// Wake every blocked caller.  From now on an attempt that finds no
    /// free slot (or no item) fails at once instead of waiting out its
    /// timeout.  Queued items can still be dequeued and free slots still
    /// filled, so nothing already in flight is lost.
    ///
    /// Stages close a queue when its other end can no longer make progress:
    /// upstream finished, downstream gone, or the run failed.
    pub fn close(&self) {
        self.free.close();
        self.filled.close();
    }

    /// Point-in-time item count.  May be stale by the time it is read.
    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
