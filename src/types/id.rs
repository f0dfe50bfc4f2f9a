//! Identifier types and team membership.

use core::fmt;

use crate::error::{Error, ErrorKind, Result};

/// Identifier of one participant process in the distributed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UnitId(pub u16);

impl UnitId {
    /// Creates a unit id.
    #[must_use]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit({})", self.0)
    }
}

/// User-chosen epoch tag carried by tasks.
///
/// Phases are compared only when reconciling deferred cross-unit
/// dependencies; they must be nondecreasing over a unit's submissions.
pub type Phase = u64;

/// Identifier of a task on its owning unit.
///
/// Task ids are allocated monotonically per unit and are never reused
/// within a process lifetime, so a stale handle from a peer can be
/// detected instead of resolving to the wrong task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Creates a task id from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// The opaque form of this id as sent to peers.
    #[must_use]
    pub const fn handle(self) -> RemoteTaskHandle {
        RemoteTaskHandle::from_raw(self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task({})", self.0)
    }
}

/// Opaque handle to a task living on a peer unit.
///
/// The bearer never dereferences it; it is carried in dependency and
/// release frames and handed back to the owning unit verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RemoteTaskHandle(u64);

impl RemoteTaskHandle {
    /// Creates a handle from its raw wire value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw wire value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Reinterprets the handle as a task id on the owning unit.
    #[must_use]
    pub const fn as_task_id(self) -> TaskId {
        TaskId::from_raw(self.0)
    }
}

impl fmt::Display for RemoteTaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rtask({:#x})", self.0)
    }
}

/// The set of units this process schedules against, and our place in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Team {
    my_id: UnitId,
    num_units: usize,
}

impl Team {
    /// Creates a team of `num_units` members with the local unit `my_id`.
    pub fn new(my_id: UnitId, num_units: usize) -> Result<Self> {
        if num_units == 0 || usize::from(my_id.raw()) >= num_units {
            return Err(Error::with_detail(
                ErrorKind::InvalidArgument,
                format!("{my_id} outside team of {num_units}"),
            ));
        }
        Ok(Self { my_id, num_units })
    }

    /// A single-unit team, for jobs without peers.
    #[must_use]
    pub const fn solo() -> Self {
        Self {
            my_id: UnitId::new(0),
            num_units: 1,
        }
    }

    /// The local unit id.
    #[must_use]
    pub const fn my_id(&self) -> UnitId {
        self.my_id
    }

    /// Number of units in the team.
    #[must_use]
    pub const fn num_units(&self) -> usize {
        self.num_units
    }

    /// Returns `true` if `unit` is the local unit.
    #[must_use]
    pub const fn is_local(&self, unit: UnitId) -> bool {
        self.my_id.raw() == unit.raw()
    }

    /// Returns `true` if `unit` is a member of the team.
    #[must_use]
    pub const fn contains(&self, unit: UnitId) -> bool {
        (unit.raw() as usize) < self.num_units
    }
}
