//! The global pointer: an address anywhere in the partitioned job.

use core::fmt;
use core::hash::{Hash, Hasher};

use super::id::UnitId;

/// Identifier of an allocation segment on a unit.
///
/// Negative ids are reserved for runtime-internal segments; segment `0`
/// is the flat (already absolute) address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SegmentId(pub i16);

impl SegmentId {
    /// The flat segment: `addr` is already unit-absolute.
    pub const FLAT: Self = Self(0);
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg({})", self.0)
    }
}

/// A pointer into the partitioned global address space.
///
/// `addr` is either a segment-relative offset or a unit-absolute address;
/// the resolver converts to absolute form before any table operation, so
/// everything past submission sees absolute addresses only.
///
/// Equality and hashing consider the owning unit and the address; the
/// segment and flag bits are carried but do not participate, matching the
/// table's address-identity discipline.
#[derive(Debug, Clone, Copy)]
pub struct GlobalPtr {
    /// Unit owning the addressed memory.
    pub unit: UnitId,
    /// Allocation segment on the owning unit.
    pub segment: SegmentId,
    /// Allocation flag bits; opaque to the dependency engine.
    pub flags: u16,
    /// Segment offset or absolute address.
    pub addr: u64,
}

impl GlobalPtr {
    /// A null pointer; used by direct task-to-task dependencies, which
    /// carry no address.
    pub const NULL: Self = Self {
        unit: UnitId::new(0),
        segment: SegmentId::FLAT,
        flags: 0,
        addr: 0,
    };

    /// Creates a flat-segment pointer to `addr` on `unit`.
    #[must_use]
    pub const fn new(unit: UnitId, addr: u64) -> Self {
        Self {
            unit,
            segment: SegmentId::FLAT,
            flags: 0,
            addr,
        }
    }

    /// Creates a segment-relative pointer.
    #[must_use]
    pub const fn in_segment(unit: UnitId, segment: SegmentId, offset: u64) -> Self {
        Self {
            unit,
            segment,
            flags: 0,
            addr: offset,
        }
    }

    /// Returns this pointer with the unit field replaced.
    ///
    /// The dependency protocol reuses the unit field of a stored record to
    /// remember a request's origin.
    #[must_use]
    pub const fn with_unit(mut self, unit: UnitId) -> Self {
        self.unit = unit;
        self
    }

    /// Returns this pointer with the address replaced by its absolute form.
    #[must_use]
    pub const fn with_addr(mut self, addr: u64) -> Self {
        self.addr = addr;
        self
    }
}

impl PartialEq for GlobalPtr {
    fn eq(&self, other: &Self) -> bool {
        self.unit == other.unit && self.addr == other.addr
    }
}

impl Eq for GlobalPtr {}

impl Hash for GlobalPtr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.unit.hash(state);
        self.addr.hash(state);
    }
}

impl fmt::Display for GlobalPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gptr({}:{}:{:#x})", self.unit, self.segment, self.addr)
    }
}

/// Converts segment-relative pointers into unit-absolute form.
///
/// Provided by the host runtime's memory layer. The engine resolves every
/// dependency address through this trait at submission time.
pub trait AddressSpace: Send + Sync {
    /// Returns the absolute address for `ptr` on its owning unit.
    fn resolve(&self, ptr: GlobalPtr) -> crate::error::Result<u64>;
}

/// The identity address space: every pointer is already absolute.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatAddressSpace;

impl AddressSpace for FlatAddressSpace {
    fn resolve(&self, ptr: GlobalPtr) -> crate::error::Result<u64> {
        Ok(ptr.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(ptr: GlobalPtr) -> u64 {
        let mut h = DefaultHasher::new();
        ptr.hash(&mut h);
        h.finish()
    }

    #[test]
    fn equality_ignores_segment_and_flags() {
        let a = GlobalPtr::new(UnitId::new(1), 0x1000);
        let mut b = GlobalPtr::in_segment(UnitId::new(1), SegmentId(7), 0x1000);
        b.flags = 0xffff;
        assert_eq!(a, b);
        assert_eq!(hash_of(a), hash_of(b));
    }

    #[test]
    fn equality_respects_unit_and_addr() {
        let a = GlobalPtr::new(UnitId::new(1), 0x1000);
        assert_ne!(a, GlobalPtr::new(UnitId::new(2), 0x1000));
        assert_ne!(a, GlobalPtr::new(UnitId::new(1), 0x1008));
    }

    #[test]
    fn flat_address_space_is_identity() {
        let ptr = GlobalPtr::new(UnitId::new(0), 0xbeef);
        assert_eq!(FlatAddressSpace.resolve(ptr).unwrap(), 0xbeef);
    }
}
