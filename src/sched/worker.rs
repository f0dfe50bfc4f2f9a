//! Worker thread loop.
//!
//! Each worker owns a local LIFO queue, registered thread-locally while
//! the loop runs so releases performed by this worker land on its own
//! queue. When no work is queued the worker drives the transport, then
//! backs off through spin, yield, and a short sleep.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::tracing_compat::trace;

use super::Scheduler;
use super::queue::LocalQueue;

const SPIN_LIMIT: u32 = 64;
const YIELD_LIMIT: u32 = 16;
const PARK_INTERVAL: Duration = Duration::from_micros(200);

/// One scheduler worker.
pub(crate) struct Worker {
    pub id: usize,
    pub sched: Arc<Scheduler>,
    pub shutdown: Arc<AtomicBool>,
    pub local: LocalQueue,
}

impl Worker {
    pub fn new(id: usize, sched: Arc<Scheduler>, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            id,
            sched,
            shutdown,
            local: LocalQueue::new(),
        }
    }

    /// Runs until shutdown; drains and cancels leftover local work on the
    /// way out.
    pub fn run_loop(&self) {
        trace!(worker = self.id, "worker started");
        let _guard = LocalQueue::set_current(self.local.clone());
        let mut backoff = 0u32;

        while !self.shutdown.load(Ordering::Relaxed) {
            if let Some(task) = self.local.pop().or_else(|| self.sched.global.pop()) {
                backoff = 0;
                self.sched.execute(&task);
                continue;
            }

            if self.sched.progress() > 0 {
                backoff = 0;
                continue;
            }

            if backoff < SPIN_LIMIT {
                std::hint::spin_loop();
                backoff += 1;
            } else if backoff < SPIN_LIMIT + YIELD_LIMIT {
                std::thread::yield_now();
                backoff += 1;
            } else {
                // Short sleep instead of a real parker: shutdown and new
                // injector work are both observed within the interval.
                std::thread::sleep(PARK_INTERVAL);
            }
        }

        while let Some(task) = self.local.pop() {
            task.cancel();
        }
        trace!(worker = self.id, "worker stopped");
    }
}
