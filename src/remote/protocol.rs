//! Outbound side of the dependency protocol.
//!
//! The engine owns the transport handle and turns protocol intents into
//! frames. Inbound frames are decoded here and handed to the scheduler's
//! handlers; a frame that fails to decode is logged and dropped, the
//! connection continues.

use std::sync::Arc;

use crate::error::Result;
use crate::tracing_compat::{error, trace};
use crate::transport::Transport;
use crate::types::{Dependency, Phase, RemoteTaskHandle, TaskId, UnitId};

use super::message::Message;

/// Frame factory and transport front-end for one unit.
pub(crate) struct RemoteEngine {
    transport: Arc<dyn Transport>,
    my_id: UnitId,
}

impl RemoteEngine {
    pub fn new(transport: Arc<dyn Transport>, my_id: UnitId) -> Self {
        Self { transport, my_id }
    }

    /// Registers `requester`'s read dependency with the unit owning the
    /// address.
    pub fn send_remote_dep(
        &self,
        target: UnitId,
        dep: &Dependency,
        phase: Phase,
        requester: TaskId,
    ) -> Result<()> {
        trace!(%target, %dep, phase, %requester, "sending remote dependency request");
        let frame = Message::RemoteDep {
            origin: self.my_id,
            phase,
            dep: *dep,
            requester: requester.handle(),
        }
        .encode();
        self.transport.send(target, frame)
    }

    /// Tells `target` that our task `dependent` must wait for its task
    /// `predecessor`.
    pub fn send_direct_dep(
        &self,
        target: UnitId,
        dependent: TaskId,
        predecessor: RemoteTaskHandle,
    ) -> Result<()> {
        trace!(%target, %dependent, %predecessor, "sending direct dependency request");
        let frame = Message::DirectDep {
            origin: self.my_id,
            dep: Dependency::direct(self.my_id),
            dependent: dependent.handle(),
            predecessor,
        }
        .encode();
        self.transport.send(target, frame)
    }

    /// Notifies `target` that the dependency it registered under `task`
    /// is satisfied.
    pub fn send_release(
        &self,
        target: UnitId,
        task: RemoteTaskHandle,
        dep: &Dependency,
    ) -> Result<()> {
        trace!(%target, %task, %dep, "sending release");
        let frame = Message::Release {
            origin: self.my_id,
            dep: *dep,
            task,
        }
        .encode();
        self.transport.send(target, frame)
    }

    /// Takes the next decodable inbound frame.
    ///
    /// Malformed frames are logged and skipped so one bad peer cannot
    /// wedge the progress loop.
    pub fn poll(&self) -> Option<Message> {
        loop {
            let frame = self.transport.poll()?;
            match Message::decode(&frame) {
                Ok(message) => return Some(message),
                Err(err) => {
                    error!(%err, len = frame.len(), "dropping undecodable frame");
                }
            }
        }
    }
}

impl core::fmt::Debug for RemoteEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RemoteEngine")
            .field("my_id", &self.my_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MeshTransport;
    use crate::types::GlobalPtr;

    #[test]
    fn frames_travel_between_engines() {
        let mut mesh = MeshTransport::mesh(2);
        let remote = Arc::new(mesh.remove(1));
        let local = Arc::new(mesh.remove(0));
        let sender = RemoteEngine::new(local, UnitId::new(0));
        let receiver = RemoteEngine::new(remote, UnitId::new(1));

        let dep = Dependency::input(GlobalPtr::new(UnitId::new(1), 0x4000));
        sender
            .send_remote_dep(UnitId::new(1), &dep, 3, TaskId::from_raw(8))
            .unwrap();

        match receiver.poll().unwrap() {
            Message::RemoteDep {
                origin,
                phase,
                dep: got,
                requester,
            } => {
                assert_eq!(origin, UnitId::new(0));
                assert_eq!(phase, 3);
                assert_eq!(got, dep);
                assert_eq!(requester, TaskId::from_raw(8).handle());
            }
            other => panic!("unexpected message {other:?}"),
        }
        assert!(receiver.poll().is_none());
    }

    #[test]
    fn malformed_frames_are_skipped() {
        let mut mesh = MeshTransport::mesh(2);
        let remote = Arc::new(mesh.remove(1));
        let local = Arc::new(mesh.remove(0));
        local.send(UnitId::new(1), vec![0xff, 0xff, 0, 0]).unwrap();
        let sender = RemoteEngine::new(local, UnitId::new(0));
        sender
            .send_release(
                UnitId::new(1),
                TaskId::from_raw(1).handle(),
                &Dependency::direct(UnitId::new(0)),
            )
            .unwrap();

        let receiver = RemoteEngine::new(remote, UnitId::new(1));
        // The garbage frame is dropped; the release still comes through.
        assert!(matches!(receiver.poll(), Some(Message::Release { .. })));
        assert!(receiver.poll().is_none());
    }
}
