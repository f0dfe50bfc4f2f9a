//! Wire format for dependency-protocol frames.
//!
//! All integers are network byte order. Every frame starts with a 2-byte
//! kind and the 2-byte origin unit. A dependency record is 18 bytes: the
//! 2-byte kind followed by the 16-byte global pointer (unit u16, segment
//! i16, flags u16, reserved u16, address u64). Task handles are 16 bytes
//! and opaque to the peer.

use crate::error::{Error, ErrorKind, Result};
use crate::types::{DepKind, Dependency, GlobalPtr, Phase, RemoteTaskHandle, SegmentId, UnitId};

/// Frame kind: register a read dependency with the owning unit.
pub(crate) const KIND_REMOTE_DEP: u16 = 1;
/// Frame kind: register an explicit task-to-task edge.
pub(crate) const KIND_DIRECT_DEP: u16 = 2;
/// Frame kind: a registered dependency has been satisfied.
pub(crate) const KIND_RELEASE: u16 = 3;

const DEP_RECORD_LEN: usize = 18;
const HANDLE_LEN: usize = 16;
const HEADER_LEN: usize = 4;

/// A decoded dependency-protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Message {
    /// A peer task reads an address this unit owns.
    RemoteDep {
        origin: UnitId,
        phase: Phase,
        dep: Dependency,
        requester: RemoteTaskHandle,
    },
    /// `dependent` on `origin` must wait for `predecessor` on this unit.
    DirectDep {
        origin: UnitId,
        dep: Dependency,
        dependent: RemoteTaskHandle,
        predecessor: RemoteTaskHandle,
    },
    /// The dependency registered under `task` is satisfied.
    Release {
        origin: UnitId,
        dep: Dependency,
        task: RemoteTaskHandle,
    },
}

impl Message {
    /// The unit that sent this frame.
    #[must_use]
    pub fn origin(&self) -> UnitId {
        match self {
            Self::RemoteDep { origin, .. }
            | Self::DirectDep { origin, .. }
            | Self::Release { origin, .. } => *origin,
        }
    }

    /// Serializes the frame.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::RemoteDep {
                origin,
                phase,
                dep,
                requester,
            } => {
                let mut buf = Vec::with_capacity(HEADER_LEN + 8 + DEP_RECORD_LEN + HANDLE_LEN);
                put_header(&mut buf, KIND_REMOTE_DEP, *origin);
                buf.extend_from_slice(&phase.to_be_bytes());
                put_dep(&mut buf, dep);
                put_handle(&mut buf, *requester);
                buf
            }
            Self::DirectDep {
                origin,
                dep,
                dependent,
                predecessor,
            } => {
                let mut buf = Vec::with_capacity(HEADER_LEN + DEP_RECORD_LEN + 2 * HANDLE_LEN);
                put_header(&mut buf, KIND_DIRECT_DEP, *origin);
                put_dep(&mut buf, dep);
                put_handle(&mut buf, *dependent);
                put_handle(&mut buf, *predecessor);
                buf
            }
            Self::Release { origin, dep, task } => {
                let mut buf = Vec::with_capacity(HEADER_LEN + DEP_RECORD_LEN + HANDLE_LEN);
                put_header(&mut buf, KIND_RELEASE, *origin);
                put_dep(&mut buf, dep);
                put_handle(&mut buf, *task);
                buf
            }
        }
    }

    /// Parses a frame, rejecting unknown kinds, short frames, and
    /// trailing garbage.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        let mut reader = FrameReader::new(frame);
        let kind = reader.u16()?;
        let origin = UnitId::new(reader.u16()?);
        let message = match kind {
            KIND_REMOTE_DEP => {
                let phase = reader.u64()?;
                let dep = reader.dep()?;
                let requester = reader.handle()?;
                Self::RemoteDep {
                    origin,
                    phase,
                    dep,
                    requester,
                }
            }
            KIND_DIRECT_DEP => {
                let dep = reader.dep()?;
                let dependent = reader.handle()?;
                let predecessor = reader.handle()?;
                Self::DirectDep {
                    origin,
                    dep,
                    dependent,
                    predecessor,
                }
            }
            KIND_RELEASE => {
                let dep = reader.dep()?;
                let task = reader.handle()?;
                Self::Release { origin, dep, task }
            }
            other => {
                return Err(Error::with_detail(
                    ErrorKind::MalformedFrame,
                    format!("unknown frame kind {other}"),
                ));
            }
        };
        reader.finish()?;
        Ok(message)
    }
}

fn put_header(buf: &mut Vec<u8>, kind: u16, origin: UnitId) {
    buf.extend_from_slice(&kind.to_be_bytes());
    buf.extend_from_slice(&origin.raw().to_be_bytes());
}

fn put_dep(buf: &mut Vec<u8>, dep: &Dependency) {
    buf.extend_from_slice(&dep.kind.as_u16().to_be_bytes());
    buf.extend_from_slice(&dep.ptr.unit.raw().to_be_bytes());
    buf.extend_from_slice(&dep.ptr.segment.0.to_be_bytes());
    buf.extend_from_slice(&dep.ptr.flags.to_be_bytes());
    buf.extend_from_slice(&0u16.to_be_bytes());
    buf.extend_from_slice(&dep.ptr.addr.to_be_bytes());
}

fn put_handle(buf: &mut Vec<u8>, handle: RemoteTaskHandle) {
    buf.extend_from_slice(&handle.raw().to_be_bytes());
    buf.extend_from_slice(&0u64.to_be_bytes());
}

/// Checked big-endian reader over one frame.
struct FrameReader<'a> {
    frame: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(frame: &'a [u8]) -> Self {
        Self { frame, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.frame.len());
        match end {
            Some(end) => {
                let bytes = &self.frame[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(Error::with_detail(
                ErrorKind::MalformedFrame,
                format!("frame truncated at byte {}", self.pos),
            )),
        }
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().expect("len checked")))
    }

    fn i16(&mut self) -> Result<i16> {
        Ok(i16::from_be_bytes(self.take(2)?.try_into().expect("len checked")))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().expect("len checked")))
    }

    fn dep(&mut self) -> Result<Dependency> {
        let kind_raw = self.u16()?;
        let kind = DepKind::from_u16(kind_raw).ok_or_else(|| {
            Error::with_detail(
                ErrorKind::MalformedFrame,
                format!("unknown dependency kind {kind_raw}"),
            )
        })?;
        let unit = UnitId::new(self.u16()?);
        let segment = SegmentId(self.i16()?);
        let flags = self.u16()?;
        let _reserved = self.u16()?;
        let addr = self.u64()?;
        Ok(Dependency {
            ptr: GlobalPtr {
                unit,
                segment,
                flags,
                addr,
            },
            kind,
        })
    }

    fn handle(&mut self) -> Result<RemoteTaskHandle> {
        let raw = self.u64()?;
        let _reserved = self.u64()?;
        Ok(RemoteTaskHandle::from_raw(raw))
    }

    fn finish(self) -> Result<()> {
        if self.pos == self.frame.len() {
            Ok(())
        } else {
            Err(Error::with_detail(
                ErrorKind::MalformedFrame,
                format!("{} trailing bytes", self.frame.len() - self.pos),
            ))
        }
    }
}
