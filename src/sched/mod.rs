//! The per-unit task scheduler.
//!
//! - [`task`]: task records and lifecycle states
//! - [`dephash`]: the address→dependency-chain table
//! - [`resolver`]: edge computation, release paths, and the inbound
//!   protocol handlers
//! - [`queue`]: worker-local and global ready queues
//! - [`worker`]: the worker thread loop

pub(crate) mod dephash;
pub(crate) mod queue;
pub(crate) mod resolver;
pub mod task;
pub(crate) mod worker;

pub use task::{Task, TaskState};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::config::RuntimeConfig;
use crate::remote::RemoteEngine;
use crate::tracing_compat::trace;
use crate::transport::Transport;
use crate::types::gptr::AddressSpace;
use crate::types::{Phase, TaskId, Team};

use dephash::DepHash;
use queue::{GlobalQueue, LocalQueue};
use task::TaskState as State;

/// Monotonic event counters for observability.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub tasks_submitted: AtomicU64,
    pub tasks_executed: AtomicU64,
    pub local_edges: AtomicU64,
    pub remote_deps_sent: AtomicU64,
    pub remote_deps_received: AtomicU64,
    pub direct_deps_sent: AtomicU64,
    pub direct_deps_received: AtomicU64,
    pub releases_sent: AtomicU64,
    pub releases_received: AtomicU64,
    pub deferred_parked: AtomicU64,
    pub deferred_transferred: AtomicU64,
    pub deferred_flushed: AtomicU64,
}

/// Point-in-time view of scheduler activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeStats {
    /// Tasks accepted by `submit`.
    pub tasks_submitted: u64,
    /// Tasks run to completion.
    pub tasks_executed: u64,
    /// Local predecessor→successor edges installed.
    pub local_edges: u64,
    /// Read-dependency registrations sent to owning units.
    pub remote_deps_sent: u64,
    /// Read-dependency registrations received from peers.
    pub remote_deps_received: u64,
    /// Task-to-task edge requests sent to peers.
    pub direct_deps_sent: u64,
    /// Task-to-task edge requests received from peers.
    pub direct_deps_received: u64,
    /// Release frames sent.
    pub releases_sent: u64,
    /// Release frames received.
    pub releases_received: u64,
    /// Remote requests parked because no writer was known yet.
    pub deferred_parked: u64,
    /// Parked requests adopted by a same-phase writer.
    pub deferred_transferred: u64,
    /// Parked requests released vacuously at a phase end.
    pub deferred_flushed: u64,
    /// Remote requests still parked right now.
    pub deferred_pending: usize,
    /// Live dependency-table entries (chains plus deferral list).
    pub table_entries: usize,
    /// Tasks submitted but not yet finished.
    pub pending_tasks: usize,
}

/// The dependency engine of one unit.
///
/// Owns the dependency table, the live-task registry, the ready queues,
/// and the protocol engine. One instance per process, shared between the
/// runtime facade and its worker threads.
pub(crate) struct Scheduler {
    pub(crate) team: Team,
    max_deps_per_task: usize,
    /// The single table mutex: buckets, entry arena, and deferral list.
    pub(crate) dephash: Mutex<DepHash>,
    /// Live tasks by id, for resolving peer handles.
    pub(crate) tasks: Mutex<HashMap<TaskId, Arc<Task>>>,
    next_task_id: AtomicU64,
    current_phase: AtomicU64,
    pub(crate) global: GlobalQueue,
    pending: AtomicUsize,
    idle_lock: Mutex<()>,
    idle_cv: Condvar,
    pub(crate) remote: RemoteEngine,
    pub(crate) addr_space: Arc<dyn AddressSpace>,
    pub(crate) counters: Counters,
}

impl Scheduler {
    pub fn new(
        config: &RuntimeConfig,
        team: Team,
        transport: Arc<dyn Transport>,
        addr_space: Arc<dyn AddressSpace>,
    ) -> Self {
        Self {
            team,
            max_deps_per_task: config.max_deps_per_task,
            dephash: Mutex::new(DepHash::new(config.dephash_buckets)),
            tasks: Mutex::new(HashMap::new()),
            next_task_id: AtomicU64::new(1),
            current_phase: AtomicU64::new(0),
            global: GlobalQueue::new(),
            pending: AtomicUsize::new(0),
            idle_lock: Mutex::new(()),
            idle_cv: Condvar::new(),
            remote: RemoteEngine::new(transport, team.my_id()),
            addr_space,
            counters: Counters::default(),
        }
    }

    pub fn max_deps_per_task(&self) -> usize {
        self.max_deps_per_task
    }

    pub fn allocate_task_id(&self) -> TaskId {
        TaskId::from_raw(self.next_task_id.fetch_add(1, Ordering::Relaxed))
    }

    /// The phase stamped onto new submissions.
    pub fn current_phase(&self) -> Phase {
        self.current_phase.load(Ordering::Acquire)
    }

    pub fn advance_phase(&self, past: Phase) {
        self.current_phase.fetch_max(past + 1, Ordering::AcqRel);
    }

    /// Tasks submitted but not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn note_submitted(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Moves a ready task onto a queue: the releasing worker's own queue
    /// when called on a worker thread, the shared injector otherwise.
    pub fn enqueue(&self, task: Arc<Task>) {
        {
            let mut inner = task.inner.lock();
            debug_assert_eq!(inner.state, State::Created, "task enqueued twice");
            inner.state = State::Queued;
        }
        trace!(id = %task.id(), "task ready");
        if !LocalQueue::push_current(task.clone()) {
            self.global.push(task);
        }
    }

    /// Pops ready work from the shared injector. Workers prefer their own
    /// queue and fall back to this.
    pub fn pop_ready(&self) -> Option<Arc<Task>> {
        self.global.pop()
    }

    /// Runs `task` to completion and releases its successors.
    pub fn execute(&self, task: &Arc<Task>) {
        let action = {
            let mut inner = task.inner.lock();
            debug_assert_eq!(inner.state, State::Queued);
            inner.state = State::Running;
            inner.action.take()
        };
        if let Some(action) = action {
            action();
        }
        self.counters.tasks_executed.fetch_add(1, Ordering::Relaxed);
        self.finish(task);
    }

    /// Transitions `task` to finished and drains both successor lists,
    /// remote before local.
    fn finish(&self, task: &Arc<Task>) {
        let (remote_successors, local_successors) = {
            let mut inner = task.inner.lock();
            inner.state = State::Finished;
            (
                core::mem::take(&mut inner.remote_successors),
                core::mem::take(&mut inner.local_successors),
            )
        };

        // Peers first: a local successor may immediately overwrite the
        // address the peer still has to read a release for.
        self.release_remote_successors(task, remote_successors);

        for successor in local_successors {
            trace!(finished = %task.id(), successor = %successor.id(), "releasing local successor");
            if successor.resolve_dependency() == 0 {
                self.enqueue(successor);
            }
        }

        self.tasks.lock().remove(&task.id());
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.idle_lock.lock();
            self.idle_cv.notify_all();
        }
    }

    /// Blocks until every submitted task has finished.
    pub fn wait_idle(&self) {
        let mut guard = self.idle_lock.lock();
        while self.pending.load(Ordering::Acquire) != 0 {
            self.idle_cv.wait(&mut guard);
        }
    }

    pub fn stats(&self) -> RuntimeStats {
        let (deferred_pending, table_entries) = {
            let table = self.dephash.lock();
            (table.unhandled_len(), table.live_entries())
        };
        let c = &self.counters;
        RuntimeStats {
            tasks_submitted: c.tasks_submitted.load(Ordering::Relaxed),
            tasks_executed: c.tasks_executed.load(Ordering::Relaxed),
            local_edges: c.local_edges.load(Ordering::Relaxed),
            remote_deps_sent: c.remote_deps_sent.load(Ordering::Relaxed),
            remote_deps_received: c.remote_deps_received.load(Ordering::Relaxed),
            direct_deps_sent: c.direct_deps_sent.load(Ordering::Relaxed),
            direct_deps_received: c.direct_deps_received.load(Ordering::Relaxed),
            releases_sent: c.releases_sent.load(Ordering::Relaxed),
            releases_received: c.releases_received.load(Ordering::Relaxed),
            deferred_parked: c.deferred_parked.load(Ordering::Relaxed),
            deferred_transferred: c.deferred_transferred.load(Ordering::Relaxed),
            deferred_flushed: c.deferred_flushed.load(Ordering::Relaxed),
            deferred_pending,
            table_entries,
            pending_tasks: self.pending(),
        }
    }
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("team", &self.team)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
