//! Core types for the Palisade runtime.
//!
//! - [`id`]: unit, task, and phase identifiers; team membership
//! - [`gptr`]: the global pointer addressing memory anywhere in the job
//! - [`dep`]: task dependency records and their read/write classification

pub mod dep;
pub mod gptr;
pub mod id;

pub use dep::{DepKind, Dependency};
pub use gptr::{GlobalPtr, SegmentId};
pub use id::{Phase, RemoteTaskHandle, TaskId, Team, UnitId};
