//! Compatibility shim for the `tracing` macros.
//!
//! With the `tracing` feature enabled (the default) the macros re-export
//! `tracing` directly. Without it they compile to nothing, so hot paths
//! carry no logging cost in minimal builds.

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, trace, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! warn_ {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
macro_rules! error {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use trace;

#[cfg(not(feature = "tracing"))]
pub(crate) use debug;

#[cfg(not(feature = "tracing"))]
pub(crate) use error;

#[cfg(not(feature = "tracing"))]
pub(crate) use warn_ as warn;
