//! Dependency resolution.
//!
//! Submission-side: hash each dependency's absolute address, walk the
//! bucket chain wiring predecessor→successor edges up to the first prior
//! writer, install the new access at the chain head, and reconcile any
//! parked remote requests the new access can satisfy.
//!
//! Completion-side: notify remote successors (with direct-dependency
//! fan-out to still-pending local writers), then release local
//! successors.
//!
//! Lock order is always table mutex before task mutex.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{Error, ErrorKind, Result};
use crate::remote::Message;
use crate::tracing_compat::{debug, error, trace, warn};
use crate::types::{DepKind, Dependency, Phase, RemoteTaskHandle, UnitId};

use super::Scheduler;
use super::dephash::DepHash;
use super::task::{RemoteSuccessor, Task, TaskAction, TaskRef, TaskState};

use std::sync::atomic::Ordering::Relaxed;

impl Scheduler {
    /// Submits a task with its declared dependencies.
    ///
    /// Returns the task record; the caller may observe its state and
    /// unresolved-dependency count but does not own it.
    pub fn submit(&self, action: TaskAction, deps: &[Dependency]) -> Result<Arc<Task>> {
        let resolved = self.validate_deps(deps)?;

        let id = self.allocate_task_id();
        let phase = self.current_phase();
        let task = Task::new(id, phase, action);
        self.tasks.lock().insert(id, Arc::clone(&task));
        self.note_submitted();
        self.counters.tasks_submitted.fetch_add(1, Relaxed);
        debug!(%id, phase, ndeps = deps.len(), "submitting task");

        let result = resolved.into_iter().try_for_each(|dep| {
            if self.team.is_local(dep.ptr.unit) {
                self.link_local_dep(&task, dep)
            } else {
                self.request_remote_dep(&task, dep)
            }
        });

        // Drop the submission hold; the task becomes eligible to run once
        // every linked predecessor has released it. This also covers the
        // error path, where the edges installed so far stay balanced.
        if task.resolve_dependency() == 0 {
            self.enqueue(Arc::clone(&task));
        }

        result.map(|()| task)
    }

    /// Checks the dependency list and resolves every address to its
    /// absolute form before anything is installed.
    fn validate_deps(&self, deps: &[Dependency]) -> Result<SmallVec<[Dependency; 8]>> {
        if deps.len() > self.max_deps_per_task() {
            return Err(Error::with_detail(
                ErrorKind::InvalidArgument,
                format!("{} dependencies exceed the configured budget", deps.len()),
            ));
        }
        let mut resolved: SmallVec<[Dependency; 8]> = SmallVec::new();
        for dep in deps {
            if dep.kind == DepKind::Direct {
                return Err(Error::with_detail(
                    ErrorKind::InvalidArgument,
                    "direct dependencies cannot be submitted",
                ));
            }
            let mut dep = *dep;
            dep.ptr = dep.ptr.with_addr(self.addr_space.resolve(dep.ptr)?);
            if !self.team.contains(dep.ptr.unit) {
                return Err(Error::with_detail(
                    ErrorKind::UnknownUnit,
                    format!("{}", dep.ptr.unit),
                ));
            }
            // Only reads can cross units: a write to peer memory has no
            // local writer chain to order against.
            if !self.team.is_local(dep.ptr.unit) && dep.kind != DepKind::In {
                return Err(Error::with_detail(
                    ErrorKind::UnsupportedRemoteDep,
                    format!("{} on {}", dep.kind, dep.ptr),
                ));
            }
            if resolved.iter().any(|earlier| earlier.ptr == dep.ptr) {
                return Err(Error::with_detail(
                    ErrorKind::InvalidArgument,
                    format!("duplicate dependency on {}", dep.ptr),
                ));
            }
            resolved.push(dep);
        }
        Ok(resolved)
    }

    /// Registers a read dependency with the peer owning the address.
    fn request_remote_dep(&self, task: &Arc<Task>, dep: Dependency) -> Result<()> {
        self.remote
            .send_remote_dep(dep.ptr.unit, &dep, task.phase(), task.id())?;
        self.counters.remote_deps_sent.fetch_add(1, Relaxed);
        // The peer answers with a release once the writer has finished
        // (or immediately, if it already has).
        task.add_dependency();
        Ok(())
    }

    /// Walks the chain for a local address, wiring edges to this task.
    fn link_local_dep(&self, task: &Arc<Task>, dep: Dependency) -> Result<()> {
        let mut table = self.dephash.lock();

        let slot = table.slot(dep.ptr.addr);
        let mut cursor = table.bucket_head(slot);
        while let Some(index) = cursor {
            let (next, entry_task, entry_dep) = {
                let entry = table.entry(index).ok_or(ErrorKind::Internal)?;
                (entry.next, entry.task.clone(), entry.dep)
            };
            cursor = next;

            let Some(predecessor) = entry_task.as_local() else {
                return Err(Error::with_detail(
                    ErrorKind::Internal,
                    "remote handle in a bucket chain",
                ));
            };

            if entry_dep.ptr.addr != dep.ptr.addr {
                continue;
            }
            if Arc::ptr_eq(predecessor, task) {
                return Err(Error::with_detail(
                    ErrorKind::Internal,
                    format!("{} already registered for {}", task.id(), dep.ptr),
                ));
            }

            {
                let mut predecessor_inner = predecessor.inner.lock();
                // Writes wait for every earlier access; reads only for
                // earlier writes.
                if predecessor_inner.state != TaskState::Finished
                    && (dep.is_write() || (dep.kind == DepKind::In && entry_dep.is_write()))
                {
                    let unresolved = task.add_dependency();
                    predecessor_inner.local_successors.push(Arc::clone(task));
                    self.counters.local_edges.fetch_add(1, Relaxed);
                    trace!(
                        predecessor = %predecessor.id(),
                        successor = %task.id(),
                        unresolved,
                        "local edge installed"
                    );
                }
            }

            if entry_dep.is_write() {
                // Earlier accesses are transitively ordered through this
                // writer; the walk can stop.
                trace!(writer = %predecessor.id(), %dep, "chain walk stopped at writer");
                break;
            }
        }

        table.push_front(TaskRef::Local(Arc::clone(task)), dep, task.phase());

        if dep.is_write() {
            self.adopt_deferred_remote(&mut table, task, dep);
        }
        Ok(())
    }

    /// Reconciles parked remote requests against a newly submitted
    /// writer.
    ///
    /// A parked read from the writer's own phase is adopted as a remote
    /// successor. A parked read from an earlier phase instead makes the
    /// writer wait for the remote reader, so the read happens before the
    /// overwrite; the request stays parked for a later writer.
    fn adopt_deferred_remote(&self, table: &mut DepHash, task: &Arc<Task>, dep: Dependency) {
        let mut prev = None;
        let mut cursor = table.unhandled_head();
        while let Some(index) = cursor {
            let (next, entry_phase, entry_dep, entry_task) = {
                let Some(entry) = table.entry(index) else { break };
                (entry.next, entry.phase, entry.dep, entry.task.clone())
            };
            cursor = next;

            if entry_dep.ptr.addr != dep.ptr.addr {
                prev = Some(index);
                continue;
            }

            if entry_phase == task.phase() {
                let Some(entry) = table.remove_unhandled(index, prev) else { break };
                debug!(
                    origin = %entry.dep.ptr.unit,
                    writer = %task.id(),
                    "adopting deferred remote dependency"
                );
                task.inner.lock().remote_successors.push(RemoteSuccessor {
                    task: entry.task,
                    dep: entry.dep,
                    phase: entry.phase,
                });
                self.counters.deferred_transferred.fetch_add(1, Relaxed);
                // prev is unchanged: the entry between prev and cursor is
                // gone.
            } else if entry_phase < task.phase() {
                // The remote reader pre-dates this writer: the writer must
                // not clobber the address before that read executed.
                if let TaskRef::Remote(handle) = entry_task {
                    match self
                        .remote
                        .send_direct_dep(entry_dep.ptr.unit, task.id(), handle)
                    {
                        Ok(()) => {
                            self.counters.direct_deps_sent.fetch_add(1, Relaxed);
                            task.add_dependency();
                        }
                        Err(err) => error!(%err, "direct dependency request failed"),
                    }
                }
                prev = Some(index);
            } else {
                prev = Some(index);
            }
        }
    }

    /// Notifies every remote successor of a finished task.
    ///
    /// For each address-carrying entry, still-pending local writers on the
    /// same address first get direct-dependency requests injected at the
    /// peer, so they cannot overtake the peer's read across the network.
    pub(super) fn release_remote_successors(
        &self,
        task: &Arc<Task>,
        successors: Vec<RemoteSuccessor>,
    ) {
        if successors.is_empty() {
            return;
        }
        trace!(id = %task.id(), count = successors.len(), "releasing remote successors");
        for successor in successors {
            if successor.dep.kind != DepKind::Direct {
                self.send_direct_dependencies(&successor);
            }
            let TaskRef::Remote(handle) = successor.task else {
                error!(id = %task.id(), "local task on remote successor list");
                continue;
            };
            match self
                .remote
                .send_release(successor.dep.ptr.unit, handle, &successor.dep)
            {
                Ok(()) => {
                    self.counters.releases_sent.fetch_add(1, Relaxed);
                }
                Err(err) => error!(%err, "release failed"),
            }
        }
    }

    /// Makes local writers that would clobber `successor`'s address wait
    /// for the remote reader.
    fn send_direct_dependencies(&self, successor: &RemoteSuccessor) {
        let TaskRef::Remote(predecessor) = successor.task else {
            return;
        };
        let origin = successor.dep.ptr.unit;

        let table = self.dephash.lock();
        let mut cursor = table.bucket_head(table.slot(successor.dep.ptr.addr));
        while let Some(index) = cursor {
            let Some(entry) = table.entry(index) else { break };
            cursor = entry.next;
            let Some(writer) = entry.task.as_local() else { continue };

            // A task with no pending dependencies is already (being)
            // executed, and everything older in the chain was released
            // before it.
            if writer.unresolved_deps() == 0 {
                break;
            }

            if entry.dep.ptr.addr == successor.dep.ptr.addr && entry.dep.is_write() {
                match self
                    .remote
                    .send_direct_dep(origin, writer.id(), predecessor)
                {
                    Ok(()) => {
                        self.counters.direct_deps_sent.fetch_add(1, Relaxed);
                        let unresolved = writer.add_dependency();
                        debug!(
                            writer = %writer.id(),
                            %origin,
                            unresolved,
                            "writer now waits for remote reader"
                        );
                    }
                    Err(err) => error!(%err, "direct dependency request failed"),
                }
            }
        }
    }

    // === Inbound protocol handlers ===

    /// Drains the transport, dispatching every decodable frame.
    ///
    /// Handler errors are logged and do not stop the drain.
    pub fn progress(&self) -> usize {
        let mut handled = 0;
        while let Some(message) = self.remote.poll() {
            handled += 1;
            let origin = message.origin();
            if let Err(err) = self.dispatch(message) {
                error!(%origin, %err, "protocol handler failed");
            }
        }
        handled
    }

    fn dispatch(&self, message: Message) -> Result<()> {
        match message {
            Message::RemoteDep {
                origin,
                phase,
                dep,
                requester,
            } => self.handle_remote_dep(origin, phase, dep, requester),
            Message::DirectDep {
                origin,
                dependent,
                predecessor,
                ..
            } => self.handle_direct_dep(origin, dependent, predecessor),
            Message::Release { dep, task, .. } => self.handle_release(dep, task),
        }
    }

    /// A peer task reads an address this unit owns: bind it to the latest
    /// local writer, or park it until that writer is submitted.
    fn handle_remote_dep(
        &self,
        origin: UnitId,
        phase: Phase,
        dep: Dependency,
        requester: RemoteTaskHandle,
    ) -> Result<()> {
        self.counters.remote_deps_received.fetch_add(1, Relaxed);
        if dep.kind != DepKind::In {
            return Err(Error::with_detail(
                ErrorKind::UnsupportedRemoteDep,
                format!("{} from {origin}", dep.kind),
            ));
        }

        // The stored record's unit field is repurposed to remember where
        // the release must go.
        let stored = Dependency {
            ptr: dep.ptr.with_unit(origin),
            kind: dep.kind,
        };

        let mut table = self.dephash.lock();
        let mut cursor = table.bucket_head(table.slot(dep.ptr.addr));
        while let Some(index) = cursor {
            let (next, entry_task, entry_dep) = {
                let entry = table.entry(index).ok_or(ErrorKind::Internal)?;
                (entry.next, entry.task.clone(), entry.dep)
            };
            cursor = next;

            if entry_dep.ptr.addr != dep.ptr.addr || !entry_dep.is_write() {
                continue;
            }
            let Some(writer) = entry_task.as_local() else {
                return Err(Error::with_detail(
                    ErrorKind::Internal,
                    "remote handle in a bucket chain",
                ));
            };

            let mut writer_inner = writer.inner.lock();
            if writer_inner.state == TaskState::Finished {
                drop(writer_inner);
                debug!(%origin, writer = %writer.id(), "writer already finished, releasing now");
                self.remote.send_release(origin, requester, &stored)?;
                self.counters.releases_sent.fetch_add(1, Relaxed);
            } else {
                debug!(%origin, writer = %writer.id(), "remote reader attached to writer");
                writer_inner.remote_successors.push(RemoteSuccessor {
                    task: TaskRef::Remote(requester),
                    dep: stored,
                    phase,
                });
            }
            return Ok(());
        }

        debug!(%origin, ptr = %dep.ptr, phase, "no writer yet, parking remote dependency");
        table.push_unhandled(TaskRef::Remote(requester), stored, phase);
        self.counters.deferred_parked.fetch_add(1, Relaxed);
        Ok(())
    }

    /// A peer wants its task to wait for one of ours: attach the peer's
    /// handle as a remote successor of our task.
    fn handle_direct_dep(
        &self,
        origin: UnitId,
        dependent: RemoteTaskHandle,
        predecessor: RemoteTaskHandle,
    ) -> Result<()> {
        self.counters.direct_deps_received.fetch_add(1, Relaxed);
        let dep = Dependency::direct(origin);

        let local = self.tasks.lock().get(&predecessor.as_task_id()).cloned();
        let Some(local) = local else {
            // Our task already finished (or never existed): the edge is
            // vacuously satisfied.
            debug!(%origin, %predecessor, "predecessor gone, releasing dependent immediately");
            self.remote.send_release(origin, dependent, &dep)?;
            self.counters.releases_sent.fetch_add(1, Relaxed);
            return Ok(());
        };

        let mut inner = local.inner.lock();
        if inner.state == TaskState::Finished {
            drop(inner);
            self.remote.send_release(origin, dependent, &dep)?;
            self.counters.releases_sent.fetch_add(1, Relaxed);
        } else {
            trace!(%origin, predecessor = %local.id(), "direct edge attached");
            inner.remote_successors.push(RemoteSuccessor {
                task: TaskRef::Remote(dependent),
                dep,
                phase: local.phase(),
            });
        }
        Ok(())
    }

    /// A dependency this unit registered with a peer has been satisfied.
    fn handle_release(&self, dep: Dependency, handle: RemoteTaskHandle) -> Result<()> {
        self.counters.releases_received.fetch_add(1, Relaxed);
        let task = self.tasks.lock().get(&handle.as_task_id()).cloned();
        let Some(task) = task else {
            return Err(Error::with_detail(
                ErrorKind::ProtocolViolation,
                format!("release for unknown {handle}"),
            ));
        };
        trace!(id = %task.id(), %dep, "remote release");
        if task.resolve_dependency() == 0 {
            self.enqueue(task);
        }
        Ok(())
    }

    // === Phase management ===

    /// Ends `phase`: releases every still-parked remote request back to
    /// its origin (its writer never materialized, so the dependency is
    /// vacuously satisfied for this phase) and advances the phase
    /// counter.
    pub fn end_phase(&self, phase: Phase) {
        self.flush_deferred();
        self.advance_phase(phase);
    }

    fn flush_deferred(&self) {
        let mut table = self.dephash.lock();
        let mut cursor = table.take_unhandled();
        while let Some(index) = cursor {
            let Some(entry) = table.recycle(index) else { break };
            cursor = entry.next;
            let TaskRef::Remote(handle) = entry.task else {
                error!("local task on the deferral list");
                continue;
            };
            debug!(origin = %entry.dep.ptr.unit, %handle, "flushing unmatched remote dependency");
            match self.remote.send_release(entry.dep.ptr.unit, handle, &entry.dep) {
                Ok(()) => {
                    self.counters.releases_sent.fetch_add(1, Relaxed);
                    self.counters.deferred_flushed.fetch_add(1, Relaxed);
                }
                Err(err) => error!(%err, "deferred release failed"),
            }
        }
    }

    /// Drops every bucket chain, recycling the entries.
    ///
    /// Only valid between jobs, when no task is in flight; live chains of
    /// unfinished tasks would lose their ordering history.
    pub fn reset(&self) {
        if self.pending() != 0 {
            warn!(pending = self.pending(), "resetting dependency table with tasks in flight");
        }
        self.dephash.lock().reset();
    }
}
