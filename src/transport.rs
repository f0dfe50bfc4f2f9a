//! Transport layer abstraction.
//!
//! The dependency protocol needs two things from the host runtime: a
//! non-blocking, per-channel-ordered way to hand a frame to a peer unit,
//! and a way to poll for frames addressed to this unit. Everything else
//! (connection management, retransmission, the wire itself) lives outside
//! the core.
//!
//! [`MeshTransport`] is the in-memory implementation used by the test
//! suite and by single-host multi-unit jobs.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, ErrorKind, Result};
use crate::types::UnitId;

/// Frame delivery between units.
///
/// Implementations must preserve order per (sender, receiver) channel and
/// must not block in either direction.
pub trait Transport: Send + Sync {
    /// Queues `frame` for delivery to `target`.
    fn send(&self, target: UnitId, frame: Vec<u8>) -> Result<()>;

    /// Takes the next frame addressed to this unit, if one has arrived.
    fn poll(&self) -> Option<Vec<u8>>;
}

#[derive(Debug)]
struct Mailbox {
    frames: Mutex<VecDeque<Vec<u8>>>,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            frames: Mutex::new(VecDeque::new()),
        }
    }
}

#[derive(Debug)]
struct MeshShared {
    mailboxes: Vec<Mailbox>,
    closed: AtomicBool,
}

/// In-memory mailbox mesh connecting the units of one process.
///
/// Every endpoint shares one set of per-unit mailboxes; `send` appends to
/// the target's mailbox and `poll` pops from the local one. FIFO per
/// mailbox gives the per-channel ordering the protocol relies on.
#[derive(Debug, Clone)]
pub struct MeshTransport {
    shared: Arc<MeshShared>,
    local: UnitId,
}

impl MeshTransport {
    /// Creates a fully connected mesh of `num_units` endpoints.
    ///
    /// The endpoint at position `u` belongs to unit `u`.
    #[must_use]
    pub fn mesh(num_units: usize) -> Vec<Self> {
        let shared = Arc::new(MeshShared {
            mailboxes: (0..num_units).map(|_| Mailbox::new()).collect(),
            closed: AtomicBool::new(false),
        });
        (0..num_units)
            .map(|u| Self {
                shared: Arc::clone(&shared),
                local: UnitId::new(u as u16),
            })
            .collect()
    }

    /// Closes the whole mesh; subsequent sends fail.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    /// Number of frames waiting in this endpoint's mailbox.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.mailboxes[usize::from(self.local.raw())]
            .frames
            .lock()
            .len()
    }
}

impl Transport for MeshTransport {
    fn send(&self, target: UnitId, frame: Vec<u8>) -> Result<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::TransportClosed));
        }
        let mailbox = self
            .shared
            .mailboxes
            .get(usize::from(target.raw()))
            .ok_or_else(|| Error::with_detail(ErrorKind::UnknownUnit, format!("{target}")))?;
        mailbox.frames.lock().push_back(frame);
        Ok(())
    }

    fn poll(&self) -> Option<Vec<u8>> {
        self.shared.mailboxes[usize::from(self.local.raw())]
            .frames
            .lock()
            .pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_arrive_in_order() {
        let mesh = MeshTransport::mesh(2);
        mesh[0].send(UnitId::new(1), vec![1]).unwrap();
        mesh[0].send(UnitId::new(1), vec![2]).unwrap();
        assert_eq!(mesh[1].poll(), Some(vec![1]));
        assert_eq!(mesh[1].poll(), Some(vec![2]));
        assert_eq!(mesh[1].poll(), None);
    }

    #[test]
    fn send_to_unknown_unit_fails() {
        let mesh = MeshTransport::mesh(1);
        let err = mesh[0].send(UnitId::new(3), vec![0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownUnit);
    }

    #[test]
    fn closed_mesh_rejects_sends() {
        let mesh = MeshTransport::mesh(2);
        mesh[0].close();
        let err = mesh[1].send(UnitId::new(0), vec![0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransportClosed);
    }
}
