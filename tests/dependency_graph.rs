//! Local dependency-graph semantics on a single unit.
//!
//! Exercises the resolver's edge computation: write-after-read,
//! read-after-read, chain cuts at writers, and the bookkeeping the
//! release path performs.

use std::sync::{Arc, Mutex};

use palisade::{Dependency, ErrorKind, GlobalPtr, Runtime, RuntimeConfig, TaskState, UnitId};

fn runtime() -> Runtime {
    Runtime::single_unit(RuntimeConfig::cooperative()).unwrap()
}

fn ptr(addr: u64) -> GlobalPtr {
    GlobalPtr::new(UnitId::new(0), addr)
}

#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<&'static str>>>);

impl Log {
    fn push(&self, entry: &'static str) -> impl FnOnce() + Send + 'static {
        let log = self.0.clone();
        move || log.lock().unwrap().push(entry)
    }

    fn entries(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }

    fn position(&self, entry: &str) -> usize {
        self.entries()
            .iter()
            .position(|e| *e == entry)
            .unwrap_or_else(|| panic!("{entry} never ran"))
    }
}

#[test]
fn write_then_read_serializes() {
    let rt = runtime();
    let log = Log::default();
    let target = ptr(0x1000);

    let writer = rt
        .submit(log.push("writer"), &[Dependency::output(target)])
        .unwrap();
    let reader = rt
        .submit(log.push("reader"), &[Dependency::input(target)])
        .unwrap();

    // The writer has no predecessors; the reader waits for the writer.
    assert_eq!(writer.state(), TaskState::Queued);
    assert_eq!(writer.unresolved_deps(), 0);
    assert_eq!(reader.state(), TaskState::Created);
    assert_eq!(reader.unresolved_deps(), 1);

    rt.wait_all();

    assert_eq!(log.entries(), vec!["writer", "reader"]);
    assert_eq!(writer.state(), TaskState::Finished);
    assert_eq!(reader.state(), TaskState::Finished);
}

#[test]
fn independent_reads_are_concurrent() {
    let rt = runtime();
    let target = ptr(0x2000);

    let first = rt.submit(|| {}, &[Dependency::input(target)]).unwrap();
    let second = rt.submit(|| {}, &[Dependency::input(target)]).unwrap();

    // No read orders against another read.
    assert_eq!(first.unresolved_deps(), 0);
    assert_eq!(second.unresolved_deps(), 0);
    assert_eq!(first.state(), TaskState::Queued);
    assert_eq!(second.state(), TaskState::Queued);

    rt.wait_all();
    assert_eq!(rt.stats().local_edges, 0);
}

#[test]
fn chain_walk_stops_at_writer() {
    let rt = runtime();
    let log = Log::default();
    let target = ptr(0x3000);

    let readers: Vec<_> = ["r1", "r2", "r3"]
        .into_iter()
        .map(|name| rt.submit(log.push(name), &[Dependency::input(target)]).unwrap())
        .collect();
    let writer = rt
        .submit(log.push("w"), &[Dependency::output(target)])
        .unwrap();
    let late_reader = rt
        .submit(log.push("r4"), &[Dependency::input(target)]).unwrap();

    // Edges are exactly r1..r3 -> w and w -> r4: the readers are free, the
    // writer waits for all three, and the late reader only for the writer.
    for reader in &readers {
        assert_eq!(reader.unresolved_deps(), 0);
    }
    assert_eq!(writer.unresolved_deps(), 3);
    assert_eq!(late_reader.unresolved_deps(), 1);
    assert_eq!(rt.stats().local_edges, 4);

    rt.wait_all();

    let w = log.position("w");
    for name in ["r1", "r2", "r3"] {
        assert!(log.position(name) < w, "{name} must run before the writer");
    }
    assert!(log.position("r4") > w, "r4 must run after the writer");
}

#[test]
fn writer_waits_for_predecessor_writer_transitively() {
    let rt = runtime();
    let target = ptr(0x3800);

    let first_writer = rt.submit(|| {}, &[Dependency::output(target)]).unwrap();
    let reader_a = rt.submit(|| {}, &[Dependency::input(target)]).unwrap();
    let reader_b = rt.submit(|| {}, &[Dependency::input(target)]).unwrap();
    let second_writer = rt.submit(|| {}, &[Dependency::inout(target)]).unwrap();

    // The second writer orders against both readers and the first writer;
    // the chain walk stops there.
    assert_eq!(first_writer.unresolved_deps(), 0);
    assert_eq!(reader_a.unresolved_deps(), 1);
    assert_eq!(reader_b.unresolved_deps(), 1);
    assert_eq!(second_writer.unresolved_deps(), 3);

    rt.wait_all();
    assert_eq!(rt.pending_tasks(), 0);
}

#[test]
fn finished_predecessors_are_not_linked() {
    let rt = runtime();
    let target = ptr(0x4000);

    rt.submit(|| {}, &[Dependency::output(target)]).unwrap();
    rt.wait_all();

    // The writer is finished; a new reader starts unblocked even though
    // the writer's chain entry is still in the table.
    let reader = rt.submit(|| {}, &[Dependency::input(target)]).unwrap();
    assert_eq!(reader.unresolved_deps(), 0);
    assert_eq!(reader.state(), TaskState::Queued);
    rt.wait_all();
}

#[test]
fn release_decrements_each_successor_once() {
    let rt = runtime();
    let target = ptr(0x5000);

    let writer = rt.submit(|| {}, &[Dependency::output(target)]).unwrap();
    let readers: Vec<_> = (0..4)
        .map(|_| rt.submit(|| {}, &[Dependency::input(target)]).unwrap())
        .collect();

    let before: i32 = readers.iter().map(|r| r.unresolved_deps()).sum();
    assert_eq!(before, 4);

    rt.wait_all();
    assert_eq!(writer.state(), TaskState::Finished);
    let after: i32 = readers.iter().map(|r| r.unresolved_deps()).sum();
    // Four edges out of the writer, four decrements.
    assert_eq!(after, 0);
}

#[test]
fn multi_address_dependencies_accumulate() {
    let rt = runtime();
    let a = ptr(0x6000);
    let b = ptr(0x7000);

    rt.submit(|| {}, &[Dependency::output(a)]).unwrap();
    rt.submit(|| {}, &[Dependency::output(b)]).unwrap();
    let joiner = rt
        .submit(|| {}, &[Dependency::input(a), Dependency::input(b)])
        .unwrap();

    assert_eq!(joiner.unresolved_deps(), 2);
    rt.wait_all();
    assert_eq!(joiner.state(), TaskState::Finished);
}

#[test]
fn submission_order_alone_implies_no_ordering() {
    let rt = runtime();

    let first = rt.submit(|| {}, &[Dependency::output(ptr(0x8000))]).unwrap();
    let second = rt.submit(|| {}, &[Dependency::output(ptr(0x8800))]).unwrap();

    // Different addresses: both are immediately ready.
    assert_eq!(first.unresolved_deps(), 0);
    assert_eq!(second.unresolved_deps(), 0);
    rt.wait_all();
}

#[test]
fn duplicate_dependency_rejected() {
    let rt = runtime();
    let target = ptr(0x9000);
    let err = rt
        .submit(|| {}, &[Dependency::input(target), Dependency::output(target)])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn dependency_budget_enforced() {
    let rt = Runtime::single_unit(RuntimeConfig {
        max_deps_per_task: 2,
        ..RuntimeConfig::cooperative()
    })
    .unwrap();
    let deps: Vec<_> = (0..3)
        .map(|i| Dependency::input(ptr(0x100 + i * 8)))
        .collect();
    let err = rt.submit(|| {}, &deps).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn reset_forgets_dependency_history() {
    let rt = runtime();
    let target = ptr(0xa000);

    rt.submit(|| {}, &[Dependency::output(target)]).unwrap();
    rt.wait_all();
    rt.reset();

    // With the chains dropped, a new writer sees no predecessors.
    let writer = rt.submit(|| {}, &[Dependency::output(target)]).unwrap();
    assert_eq!(writer.unresolved_deps(), 0);
    rt.wait_all();
}

#[test]
fn stats_reflect_activity() {
    let rt = runtime();
    let target = ptr(0xb000);

    rt.submit(|| {}, &[Dependency::output(target)]).unwrap();
    rt.submit(|| {}, &[Dependency::input(target)]).unwrap();
    rt.wait_all();

    let stats = rt.stats();
    assert_eq!(stats.tasks_submitted, 2);
    assert_eq!(stats.tasks_executed, 2);
    assert_eq!(stats.local_edges, 1);
    assert_eq!(stats.pending_tasks, 0);
    assert_eq!(stats.remote_deps_sent, 0);
}

#[test]
fn worker_threads_preserve_ordering() {
    use std::sync::atomic::{AtomicU64, Ordering};

    let rt = Runtime::single_unit(RuntimeConfig::with_workers(2)).unwrap();
    let target = ptr(0xc000);
    let cell = Arc::new(AtomicU64::new(0));
    let observed = Arc::new(Mutex::new(Vec::new()));

    {
        let cell = cell.clone();
        rt.submit(move || cell.store(1, Ordering::SeqCst), &[Dependency::output(target)])
            .unwrap();
    }
    for _ in 0..8 {
        let cell = cell.clone();
        let observed = observed.clone();
        rt.submit(
            move || observed.lock().unwrap().push(cell.load(Ordering::SeqCst)),
            &[Dependency::input(target)],
        )
        .unwrap();
    }
    {
        let cell = cell.clone();
        rt.submit(move || cell.store(2, Ordering::SeqCst), &[Dependency::inout(target)])
            .unwrap();
    }

    rt.wait_all();

    // Every reader ran between the two writes.
    let observed = observed.lock().unwrap();
    assert_eq!(observed.len(), 8);
    assert!(observed.iter().all(|v| *v == 1), "readers saw {observed:?}");
    assert_eq!(cell.load(Ordering::SeqCst), 2);
}

#[test]
fn wait_all_returns_immediately_when_idle() {
    let rt = runtime();
    rt.wait_all();
    assert_eq!(rt.pending_tasks(), 0);
}
