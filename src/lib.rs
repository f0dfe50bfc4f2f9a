//! # Palisade
//!
//! A task dependency engine for a partitioned global address space job.
//!
//! Tasks are submitted with read/write dependencies on globally
//! addressable memory locations. The engine wires happens-before edges
//! between tasks touching the same location, extends those edges across
//! units with a small asynchronous protocol, and executes tasks on worker
//! threads (or cooperatively on the caller's thread) once their
//! predecessors have finished.
//!
//! # Architecture
//!
//! - [`sched`]: the dependency table, resolver, task records, and workers
//! - [`remote`] (internal): the cross-unit dependency protocol
//! - [`locality`]: the node/module/NUMA/core domain hierarchy
//! - [`transport`]: the frame-delivery seam to the host runtime
//! - [`types`]: global pointers, dependencies, unit and task identity
//!
//! # Ordering model
//!
//! Within one address the engine preserves serial semantics: a write
//! waits for every earlier access, a read waits for the latest earlier
//! write, and independent reads run concurrently. Across addresses only
//! declared dependencies order anything. Across units, read dependencies
//! on a peer's memory are registered with the owning unit and released
//! when the corresponding writer finishes.
//!
//! # Example
//!
//! ```rust
//! use palisade::{Dependency, GlobalPtr, Runtime, RuntimeConfig, UnitId};
//!
//! let rt = Runtime::single_unit(RuntimeConfig::cooperative()).unwrap();
//! let ptr = GlobalPtr::new(UnitId::new(0), 0x1000);
//!
//! rt.submit(|| { /* produce */ }, &[Dependency::output(ptr)]).unwrap();
//! rt.submit(|| { /* consume */ }, &[Dependency::input(ptr)]).unwrap();
//! rt.wait_all();
//! ```

pub mod config;
pub mod error;
pub mod locality;
pub mod sched;
pub mod transport;
pub mod types;

mod runtime;

pub(crate) mod remote;
pub(crate) mod tracing_compat;
pub(crate) mod util;

pub use config::{ConfigError, RuntimeConfig};
pub use error::{Error, ErrorKind, Result};
pub use locality::{DomainScope, HwInfo, LocalityDomain, LocalityMap, UnitLocality};
pub use runtime::Runtime;
pub use sched::{RuntimeStats, Task, TaskState};
pub use transport::{MeshTransport, Transport};
pub use types::gptr::{AddressSpace, FlatAddressSpace};
pub use types::{DepKind, Dependency, GlobalPtr, Phase, SegmentId, TaskId, Team, UnitId};
