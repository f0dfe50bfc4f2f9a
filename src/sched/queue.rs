//! Ready queues.
//!
//! Each worker owns a LIFO local queue registered in thread-local storage
//! while the worker runs; releases performed on that thread land there, so
//! a freshly released successor runs with a warm cache. Everything else
//! (submissions from non-worker threads, cooperative drivers, remote
//! releases handled off-worker) goes through the shared FIFO injector.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;

use super::task::Task;

thread_local! {
    static CURRENT_QUEUE: RefCell<Option<LocalQueue>> = const { RefCell::new(None) };
}

/// A worker's own LIFO queue.
#[derive(Debug, Clone)]
pub(crate) struct LocalQueue {
    inner: Arc<Mutex<VecDeque<Arc<Task>>>>,
}

impl LocalQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn push(&self, task: Arc<Task>) {
        self.inner.lock().push_back(task);
    }

    pub fn pop(&self) -> Option<Arc<Task>> {
        self.inner.lock().pop_back()
    }

    /// Registers this queue as the current thread's queue for the lifetime
    /// of the returned guard.
    pub fn set_current(queue: LocalQueue) -> CurrentQueueGuard {
        CURRENT_QUEUE.with(|current| {
            *current.borrow_mut() = Some(queue);
        });
        CurrentQueueGuard
    }

    /// Pushes onto the current thread's queue, if one is registered.
    pub fn push_current(task: Arc<Task>) -> bool {
        CURRENT_QUEUE.with(|current| match &*current.borrow() {
            Some(queue) => {
                queue.push(task);
                true
            }
            None => false,
        })
    }
}

/// Clears the thread-local queue registration on drop.
pub(crate) struct CurrentQueueGuard;

impl Drop for CurrentQueueGuard {
    fn drop(&mut self) {
        CURRENT_QUEUE.with(|current| {
            *current.borrow_mut() = None;
        });
    }
}

/// Shared injection queue for tasks released outside a worker thread.
#[derive(Debug, Default)]
pub(crate) struct GlobalQueue {
    inner: SegQueue<Arc<Task>>,
}

impl GlobalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: Arc<Task>) {
        self.inner.push(task);
    }

    pub fn pop(&self) -> Option<Arc<Task>> {
        self.inner.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskId;

    fn task(id: u64) -> Arc<Task> {
        Task::new(TaskId::from_raw(id), 0, Box::new(|| {}))
    }

    #[test]
    fn local_queue_is_lifo() {
        let queue = LocalQueue::new();
        queue.push(task(1));
        queue.push(task(2));
        assert_eq!(queue.pop().unwrap().id(), TaskId::from_raw(2));
        assert_eq!(queue.pop().unwrap().id(), TaskId::from_raw(1));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn push_current_requires_registration() {
        assert!(!LocalQueue::push_current(task(1)));
        let queue = LocalQueue::new();
        {
            let _guard = LocalQueue::set_current(queue.clone());
            assert!(LocalQueue::push_current(task(2)));
        }
        assert!(!LocalQueue::push_current(task(3)));
        assert_eq!(queue.pop().unwrap().id(), TaskId::from_raw(2));
    }

    #[test]
    fn global_queue_is_fifo() {
        let queue = GlobalQueue::new();
        queue.push(task(1));
        queue.push(task(2));
        assert_eq!(queue.pop().unwrap().id(), TaskId::from_raw(1));
        assert_eq!(queue.pop().unwrap().id(), TaskId::from_raw(2));
    }
}
