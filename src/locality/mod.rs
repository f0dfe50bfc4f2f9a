//! The locality and topology model.
//!
//! - [`hwinfo`]: per-unit hardware records seeded by the host runtime
//! - [`domain`]: the domain tree and dot-path tag lookup
//! - [`build`]: recursive tree construction from unit records

pub mod build;
pub mod domain;
pub mod hwinfo;

pub use build::LocalityMap;
pub use domain::{DomainScope, LocalityDomain};
pub use hwinfo::{HwInfo, UnitLocality};
