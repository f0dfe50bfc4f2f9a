//! The runtime facade.
//!
//! One [`Runtime`] per unit: it owns the scheduler, the locality tree,
//! and the worker threads. With `workers = 0` nothing is spawned and the
//! caller drives execution through [`Runtime::wait_all`] or
//! [`Runtime::step`]; that is the mode the test suite uses, and the mode
//! for embedding into a host runtime that brings its own threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use crate::config::RuntimeConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::locality::{HwInfo, LocalityDomain, LocalityMap, UnitLocality};
use crate::sched::worker::Worker;
use crate::sched::{RuntimeStats, Scheduler, Task};
use crate::tracing_compat::debug;
use crate::transport::{MeshTransport, Transport};
use crate::types::gptr::{AddressSpace, FlatAddressSpace};
use crate::types::{Dependency, Phase, Team, UnitId};

/// A unit's task dependency engine.
pub struct Runtime {
    sched: Arc<Scheduler>,
    locality: LocalityMap,
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    cooperative: bool,
}

impl Runtime {
    /// Creates a runtime with the flat (identity) address space.
    ///
    /// `units` seeds the locality tree; pass an empty vector to
    /// synthesize single-core records for every team member.
    pub fn new(
        config: RuntimeConfig,
        team: Team,
        transport: Arc<dyn Transport>,
        units: Vec<UnitLocality>,
    ) -> Result<Self> {
        Self::with_address_space(config, team, transport, units, Arc::new(FlatAddressSpace))
    }

    /// Creates a runtime with a host-provided address space.
    pub fn with_address_space(
        config: RuntimeConfig,
        team: Team,
        transport: Arc<dyn Transport>,
        units: Vec<UnitLocality>,
        addr_space: Arc<dyn AddressSpace>,
    ) -> Result<Self> {
        config
            .validate()
            .map_err(|err| Error::with_detail(ErrorKind::InvalidArgument, err.to_string()))?;

        let units = if units.is_empty() {
            (0..team.num_units())
                .map(|u| {
                    UnitLocality::new(UnitId::new(u as u16), "localhost", HwInfo::single_core())
                })
                .collect()
        } else {
            units
        };
        if units.len() != team.num_units() {
            return Err(Error::with_detail(
                ErrorKind::InvalidArgument,
                format!(
                    "{} locality records for a team of {}",
                    units.len(),
                    team.num_units()
                ),
            ));
        }
        let locality = LocalityMap::build(units)?;

        let sched = Arc::new(Scheduler::new(&config, team, transport, addr_space));
        let shutdown = Arc::new(AtomicBool::new(false));
        let cooperative = config.workers == 0;

        let workers = (0..config.workers)
            .map(|id| {
                let worker = Worker::new(id, Arc::clone(&sched), Arc::clone(&shutdown));
                std::thread::Builder::new()
                    .name(format!("palisade-worker-{id}"))
                    .spawn(move || worker.run_loop())
                    .map_err(|err| Error::with_detail(ErrorKind::Internal, err.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(unit = %team.my_id(), workers = config.workers, "runtime started");
        Ok(Self {
            sched,
            locality,
            shutdown,
            workers,
            cooperative,
        })
    }

    /// A one-unit runtime over a loopback mesh, in cooperative mode
    /// unless the config says otherwise.
    pub fn single_unit(config: RuntimeConfig) -> Result<Self> {
        let transport = MeshTransport::mesh(1).remove(0);
        Self::new(config, Team::solo(), Arc::new(transport), Vec::new())
    }

    /// One runtime per unit of an in-process mesh, for single-host jobs
    /// and tests. All runtimes share the configuration.
    pub fn local_mesh(config: RuntimeConfig, num_units: usize) -> Result<Vec<Self>> {
        MeshTransport::mesh(num_units)
            .into_iter()
            .enumerate()
            .map(|(u, endpoint)| {
                Self::new(
                    config.clone(),
                    Team::new(UnitId::new(u as u16), num_units)?,
                    Arc::new(endpoint),
                    Vec::new(),
                )
            })
            .collect()
    }

    /// The local unit id.
    #[must_use]
    pub fn my_id(&self) -> UnitId {
        self.sched.team.my_id()
    }

    /// Number of units in the job.
    #[must_use]
    pub fn num_units(&self) -> usize {
        self.sched.team.num_units()
    }

    /// Submits a task with its data dependencies.
    ///
    /// The returned record can be used to observe the task's state; the
    /// scheduler keeps ownership until the task finishes.
    pub fn submit<F>(&self, action: F, deps: &[Dependency]) -> Result<Arc<Task>>
    where
        F: FnOnce() + Send + 'static,
    {
        self.sched.submit(Box::new(action), deps)
    }

    /// Blocks until every submitted task has finished.
    ///
    /// In cooperative mode the calling thread executes the tasks itself,
    /// polling the transport between them. With workers this parks until
    /// the workers drain the job. Either way, tasks blocked on a peer's
    /// release wait until that peer makes progress.
    pub fn wait_all(&self) {
        if !self.cooperative {
            self.sched.wait_idle();
            return;
        }
        loop {
            if let Some(task) = self.sched.pop_ready() {
                self.sched.execute(&task);
                continue;
            }
            if self.sched.progress() > 0 {
                continue;
            }
            if self.sched.pending() == 0 {
                break;
            }
            std::thread::yield_now();
        }
    }

    /// Makes a bounded amount of progress: drains inbound frames and runs
    /// at most one ready task. Returns `true` if anything happened.
    ///
    /// This is the building block for driving several cooperative
    /// runtimes from one thread.
    pub fn step(&self) -> bool {
        let mut advanced = self.sched.progress() > 0;
        if let Some(task) = self.sched.pop_ready() {
            self.sched.execute(&task);
            advanced = true;
        }
        advanced
    }

    /// Drains the transport's inbound queue, dispatching dependency
    /// requests and releases.
    pub fn progress_once(&self) {
        self.sched.progress();
    }

    /// Ends `phase`: vacuously releases every deferred remote request and
    /// advances the submission phase past `phase`.
    pub fn end_phase(&self, phase: Phase) {
        self.sched.end_phase(phase);
    }

    /// The phase new submissions are stamped with.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.sched.current_phase()
    }

    /// Tasks submitted but not yet finished.
    #[must_use]
    pub fn pending_tasks(&self) -> usize {
        self.sched.pending()
    }

    /// Drops all dependency history. Only meaningful between jobs, with
    /// no tasks in flight.
    pub fn reset(&self) {
        self.sched.reset();
    }

    /// Resolves a locality domain by its dot-path tag.
    pub fn domain(&self, tag: &str) -> Result<&LocalityDomain> {
        self.locality.domain(tag)
    }

    /// The locality record of `unit`, including its core-domain tag.
    pub fn unit_locality(&self, unit: UnitId) -> Result<&UnitLocality> {
        self.locality.unit(unit)
    }

    /// The whole locality tree.
    #[must_use]
    pub fn locality(&self) -> &LocalityMap {
        &self.locality
    }

    /// Scheduler activity counters.
    #[must_use]
    pub fn stats(&self) -> RuntimeStats {
        self.sched.stats()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        // Whatever never ran is cancelled, not leaked.
        while let Some(task) = self.sched.pop_ready() {
            task.cancel();
        }
    }
}

impl core::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Runtime")
            .field("unit", &self.my_id())
            .field("pending", &self.pending_tasks())
            .field("cooperative", &self.cooperative)
            .finish_non_exhaustive()
    }
}
