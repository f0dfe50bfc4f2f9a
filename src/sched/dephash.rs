//! The dependency hash table.
//!
//! Maps the absolute address of a dependency to the chain of tasks that
//! have declared dependencies on it. Chains are singly linked in LIFO
//! order, so the head of a bucket is always the most recently submitted
//! access and the first write encountered during a walk is the latest
//! writer.
//!
//! Entries live in a slot arena; unlinking an entry pushes its slot onto
//! the arena's vacant list, which is the recycling free list submissions
//! allocate from. The table also carries the deferral list of remote
//! dependency requests that arrived before their local writer was
//! submitted.
//!
//! The table has no lock of its own: the scheduler wraps it in the single
//! dependency-table mutex, which by construction also covers the arena
//! free list and the deferral list.

use crate::types::{Dependency, Phase};
use crate::util::{Arena, ArenaIndex};

use super::task::TaskRef;

/// One link in a bucket chain or in the deferral list.
#[derive(Debug)]
pub(crate) struct DepEntry {
    pub next: Option<ArenaIndex>,
    pub task: TaskRef,
    pub dep: Dependency,
    pub phase: Phase,
}

/// Bucketed map from absolute address to dependency chains.
#[derive(Debug)]
pub(crate) struct DepHash {
    buckets: Vec<Option<ArenaIndex>>,
    entries: Arena<DepEntry>,
    unhandled_head: Option<ArenaIndex>,
    unhandled_len: usize,
}

impl DepHash {
    pub fn new(num_buckets: usize) -> Self {
        Self {
            buckets: vec![None; num_buckets],
            entries: Arena::new(),
            unhandled_head: None,
            unhandled_len: 0,
        }
    }

    /// Bucket slot for an absolute address.
    ///
    /// Addresses of aligned allocations have three trailing zero bits, so
    /// those are discarded; the rest is XOR-folded through the Marsaglia
    /// shift triplet (7, 11, 17) before reduction.
    pub fn slot(&self, addr: u64) -> usize {
        let offset = addr >> 3;
        let folded = offset ^ (offset >> 7) ^ (offset >> 11) ^ (offset >> 17);
        (folded % self.buckets.len() as u64) as usize
    }

    pub fn bucket_head(&self, slot: usize) -> Option<ArenaIndex> {
        self.buckets[slot]
    }

    pub fn entry(&self, index: ArenaIndex) -> Option<&DepEntry> {
        self.entries.get(index)
    }

    /// Installs `task`'s access as the new head of its address's chain.
    pub fn push_front(&mut self, task: TaskRef, dep: Dependency, phase: Phase) -> ArenaIndex {
        let slot = self.slot(dep.ptr.addr);
        let head = self.buckets[slot];
        let index = self.entries.insert(DepEntry {
            next: head,
            task,
            dep,
            phase,
        });
        self.buckets[slot] = Some(index);
        index
    }

    /// Parks a remote request that found no local writer.
    pub fn push_unhandled(&mut self, task: TaskRef, dep: Dependency, phase: Phase) -> ArenaIndex {
        let index = self.entries.insert(DepEntry {
            next: self.unhandled_head,
            task,
            dep,
            phase,
        });
        self.unhandled_head = Some(index);
        self.unhandled_len += 1;
        index
    }

    pub fn unhandled_head(&self) -> Option<ArenaIndex> {
        self.unhandled_head
    }

    /// Number of parked remote requests.
    pub fn unhandled_len(&self) -> usize {
        self.unhandled_len
    }

    /// Unlinks one entry from the deferral list and returns its payload.
    ///
    /// `prev` is the caller's walk cursor: the entry preceding `index`,
    /// or `None` when `index` is the list head.
    pub fn remove_unhandled(&mut self, index: ArenaIndex, prev: Option<ArenaIndex>) -> Option<DepEntry> {
        let next = self.entries.get(index)?.next;
        match prev {
            Some(prev) => self.entries.get_mut(prev)?.next = next,
            None => self.unhandled_head = next,
        }
        self.unhandled_len -= 1;
        self.entries.remove(index)
    }

    /// Detaches the whole deferral list for draining.
    pub fn take_unhandled(&mut self) -> Option<ArenaIndex> {
        self.unhandled_len = 0;
        self.unhandled_head.take()
    }

    /// Recycles one detached entry and returns its payload.
    pub fn recycle(&mut self, index: ArenaIndex) -> Option<DepEntry> {
        self.entries.remove(index)
    }

    /// Drops every bucket chain back onto the free list.
    ///
    /// The deferral list is left alone; it is owned by the phase-end
    /// flush.
    pub fn reset(&mut self) {
        for slot in 0..self.buckets.len() {
            let mut cursor = self.buckets[slot].take();
            while let Some(index) = cursor {
                cursor = self.entries.remove(index).and_then(|entry| entry.next);
            }
        }
    }

    /// Number of live entries across chains and the deferral list.
    pub fn live_entries(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::task::Task;
    use crate::types::{GlobalPtr, TaskId, UnitId};

    fn entry_task(id: u64) -> TaskRef {
        TaskRef::Local(Task::new(TaskId::from_raw(id), 0, Box::new(|| {})))
    }

    fn dep(addr: u64) -> Dependency {
        Dependency::output(GlobalPtr::new(UnitId::new(0), addr))
    }

    #[test]
    fn slot_discards_alignment_bits() {
        let table = DepHash::new(1024);
        // Addresses within one aligned word share a slot.
        assert_eq!(table.slot(0x1000), table.slot(0x1007));
        // Slots must stay inside the table for arbitrary addresses.
        for addr in [0u64, 7, 0x1000, u64::MAX] {
            assert!(table.slot(addr) < 1024);
        }
    }

    #[test]
    fn chains_are_lifo() {
        let mut table = DepHash::new(64);
        let first = table.push_front(entry_task(1), dep(0x40), 0);
        let second = table.push_front(entry_task(2), dep(0x40), 0);
        let head = table.bucket_head(table.slot(0x40)).unwrap();
        assert_eq!(head, second);
        assert_eq!(table.entry(head).unwrap().next, Some(first));
    }

    #[test]
    fn unhandled_unlink_keeps_list_intact() {
        let mut table = DepHash::new(64);
        let a = table.push_unhandled(entry_task(1), dep(0x10), 1);
        let b = table.push_unhandled(entry_task(2), dep(0x20), 1);
        let c = table.push_unhandled(entry_task(3), dep(0x30), 1);
        assert_eq!(table.unhandled_len(), 3);

        // List is c -> b -> a; removing the middle relinks c -> a.
        table.remove_unhandled(b, Some(c)).unwrap();
        assert_eq!(table.unhandled_len(), 2);
        assert_eq!(table.entry(c).unwrap().next, Some(a));

        // Removing the head moves the head pointer.
        table.remove_unhandled(c, None).unwrap();
        assert_eq!(table.unhandled_head(), Some(a));
    }

    #[test]
    fn reset_recycles_chains_but_not_deferrals() {
        let mut table = DepHash::new(64);
        table.push_front(entry_task(1), dep(0x40), 0);
        table.push_front(entry_task(2), dep(0x48), 0);
        table.push_unhandled(entry_task(3), dep(0x50), 2);
        assert_eq!(table.live_entries(), 3);

        table.reset();
        assert_eq!(table.live_entries(), 1);
        assert_eq!(table.unhandled_len(), 1);
        assert!(table.bucket_head(table.slot(0x40)).is_none());
    }
}
