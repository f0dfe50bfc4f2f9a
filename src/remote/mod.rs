//! Cross-unit extension of the dependency graph.
//!
//! - [`message`]: network-byte-order frame codec
//! - [`protocol`]: outbound frame factory and inbound decode loop
//!
//! The receiving-side handlers live with the resolver in
//! [`crate::sched`], since they operate on the same dependency table.

pub(crate) mod message;
pub(crate) mod protocol;

pub(crate) use message::Message;
pub(crate) use protocol::RemoteEngine;
