//! FIFO work queue with a drain barrier.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

/// Returned when the queue has been closed by shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("work queue is closed")]
pub struct QueueClosed;

/// Strict FIFO queue shared by the listeners (producers) and the worker.
///
/// Every `put` adds one unfinished task; the worker calls
/// [`WorkQueue::task_done`] once it has fully handled a popped item.
/// [`WorkQueue::join`] waits until no unfinished task remains.
#[derive(Debug)]
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
    drained: Condvar,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    unfinished: usize,
    closed: bool,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    /// An empty, open queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                unfinished: 0,
                closed: false,
            }),
            available: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    /// Appends an item.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] after [`WorkQueue::close`].
    pub fn put(&self, item: T) -> Result<(), QueueClosed> {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueClosed);
        }
        state.items.push_back(item);
        state.unfinished = state.unfinished.saturating_add(1);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Removes the oldest item, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.items.pop_front() {
                return Some(item);
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Marks one popped item as fully handled.
    pub fn task_done(&self) {
        let mut state = self.lock();
        state.unfinished = state.unfinished.saturating_sub(1);
        let drained = state.unfinished == 0;
        drop(state);
        if drained {
            self.drained.notify_all();
        }
    }

    /// Blocks until every item put so far has been marked done.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if the queue is closed while waiting.
    pub fn join(&self) -> Result<(), QueueClosed> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(QueueClosed);
            }
            if state.unfinished == 0 {
                return Ok(());
            }
            state = self
                .drained
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Closes the queue, abandoning waiting items and waking every waiter.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.items.clear();
        drop(state);
        self.available.notify_all();
        self.drained.notify_all();
    }

    /// Number of items waiting to be popped.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// Whether no item is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items put but not yet marked done, including one being worked on.
    #[must_use]
    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn pops_in_insertion_order() {
        let queue = WorkQueue::new();
        for item in 1..=3 {
            queue.put(item).expect("put");
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(
            [queue.pop(), queue.pop(), queue.pop()],
            [Some(1), Some(2), Some(3)]
        );
    }

    #[test]
    fn join_returns_immediately_when_nothing_is_pending() {
        let queue = WorkQueue::<u8>::new();
        assert_eq!(queue.join(), Ok(()));
    }

    #[test]
    fn join_waits_for_task_done_not_pop() {
        let queue = Arc::new(WorkQueue::new());
        queue.put("job").expect("put");
        assert_eq!(queue.pop(), Some("job"));
        assert!(queue.is_empty());
        assert_eq!(queue.unfinished(), 1);

        let joined = Arc::new(AtomicBool::new(false));
        let waiter = {
            let queue = Arc::clone(&queue);
            let joined = Arc::clone(&joined);
            thread::spawn(move || {
                queue.join().expect("join");
                joined.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!joined.load(Ordering::SeqCst), "join returned early");
        queue.task_done();
        waiter.join().expect("waiter thread");
        assert!(joined.load(Ordering::SeqCst));
    }

    #[test]
    fn close_wakes_consumers_and_joiners() {
        let queue = Arc::new(WorkQueue::<u8>::new());
        queue.put(1).expect("put");
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                assert_eq!(queue.pop(), Some(1));
                queue.pop()
            })
        };
        let joiner = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.join())
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        assert_eq!(consumer.join().expect("consumer thread"), None);
        assert_eq!(joiner.join().expect("joiner thread"), Err(QueueClosed));
        assert_eq!(queue.put(2), Err(QueueClosed));
    }
}
