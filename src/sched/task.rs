//! Task records.
//!
//! A task is owned by the scheduler from submission until it finishes.
//! Its mutex guards the state field and both successor lists; the
//! unresolved-dependency counter is atomic so the resolver and release
//! paths can adjust it without taking the task lock.

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::types::{Dependency, Phase, RemoteTaskHandle, TaskId};

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Submitted; waiting for unresolved dependencies.
    Created,
    /// All dependencies resolved; sitting in a ready queue.
    Queued,
    /// Executing on a worker.
    Running,
    /// Ran to completion; successors have been notified.
    Finished,
    /// Dropped without running during runtime shutdown.
    Cancelled,
}

impl TaskState {
    /// Returns `true` once the task can no longer run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Cancelled)
    }
}

/// The user work a task performs.
pub(crate) type TaskAction = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a predecessor or successor task: either a task on this unit
/// or an opaque handle to one on a peer.
#[derive(Clone)]
pub(crate) enum TaskRef {
    Local(Arc<Task>),
    Remote(RemoteTaskHandle),
}

impl TaskRef {
    pub(crate) fn as_local(&self) -> Option<&Arc<Task>> {
        match self {
            Self::Local(task) => Some(task),
            Self::Remote(_) => None,
        }
    }
}

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(task) => write!(f, "Local({})", task.id()),
            Self::Remote(handle) => write!(f, "Remote({handle})"),
        }
    }
}

/// A peer task that must be notified when the bearer finishes.
///
/// The dependency's unit field holds the origin unit the release frame is
/// routed to.
#[derive(Debug, Clone)]
pub(crate) struct RemoteSuccessor {
    pub task: TaskRef,
    pub dep: Dependency,
    pub phase: Phase,
}

/// Lock-guarded part of a task record.
pub(crate) struct TaskInner {
    pub state: TaskState,
    pub action: Option<TaskAction>,
    pub local_successors: SmallVec<[Arc<Task>; 4]>,
    pub remote_successors: Vec<RemoteSuccessor>,
}

/// One schedulable unit of work with declared data dependencies.
pub struct Task {
    id: TaskId,
    phase: Phase,
    unresolved_deps: AtomicI32,
    pub(crate) inner: Mutex<TaskInner>,
}

impl Task {
    /// Creates a task record in `Created` state.
    ///
    /// The counter starts at one: the submission itself holds a reference
    /// that is resolved once every dependency has been processed, so a
    /// predecessor finishing mid-submission cannot enqueue the task early.
    pub(crate) fn new(id: TaskId, phase: Phase, action: TaskAction) -> Arc<Self> {
        Arc::new(Self {
            id,
            phase,
            unresolved_deps: AtomicI32::new(1),
            inner: Mutex::new(TaskInner {
                state: TaskState::Created,
                action: Some(action),
                local_successors: SmallVec::new(),
                remote_successors: Vec::new(),
            }),
        })
    }

    /// The task's id on this unit.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// The phase the task was submitted in.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    /// Number of predecessors that have not yet released this task.
    #[must_use]
    pub fn unresolved_deps(&self) -> i32 {
        self.unresolved_deps.load(Ordering::Acquire)
    }

    /// Records one more predecessor. Returns the new count.
    pub(crate) fn add_dependency(&self) -> i32 {
        self.unresolved_deps.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Releases one predecessor. Returns the remaining count.
    ///
    /// A negative result means a predecessor released this task twice;
    /// that is unrecoverable and asserts.
    pub(crate) fn resolve_dependency(&self) -> i32 {
        let left = self.unresolved_deps.fetch_sub(1, Ordering::AcqRel) - 1;
        assert!(left >= 0, "{} released more often than it has dependencies", self.id);
        left
    }

    /// Marks a never-run task as cancelled during shutdown.
    pub(crate) fn cancel(&self) {
        let mut inner = self.inner.lock();
        if !inner.state.is_terminal() {
            inner.state = TaskState::Cancelled;
            inner.action = None;
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("unresolved_deps", &self.unresolved_deps())
            .finish_non_exhaustive()
    }
}
