//! The per-node execution loop.
//!
//! Single-threaded and cooperative: each tick polls the transfer
//! manager, updates every active job, admits pending jobs whose
//! dependencies have completed, and takes in at most one new command —
//! the master pops its local queue, workers probe the transport. A
//! shutdown command flips `done`; the loop exits once `done` is set and
//! no job remains.

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use tracing::{debug, trace};

use chorus_graph::{CommandId, NodeId};

use crate::error::Result;
use crate::job::{Job, KernelLauncher};
use crate::storage::BufferStorage;
use crate::transfer::TransferManager;
use crate::transport::Transport;
use crate::wire::{self, CommandPkg};

struct PendingJob {
    pkg: CommandPkg,
    deps: Vec<CommandId>,
}

pub struct Executor {
    transport: Rc<dyn Transport>,
    transfers: TransferManager,
    launcher: Box<dyn KernelLauncher>,
    /// Commands the master dispatches to itself.
    local_queue: VecDeque<(CommandPkg, Vec<CommandId>)>,
    /// Received jobs still waiting on dependencies.
    pending: Vec<PendingJob>,
    active: Vec<Job>,
    completed: HashSet<CommandId>,
    done: bool,
}

impl Executor {
    pub fn new(
        transport: Rc<dyn Transport>,
        storage: Rc<RefCell<BufferStorage>>,
        launcher: Box<dyn KernelLauncher>,
    ) -> Self {
        let transfers = TransferManager::new(Rc::clone(&transport), storage);
        Self {
            transport,
            transfers,
            launcher,
            local_queue: VecDeque::new(),
            pending: Vec::new(),
            active: Vec::new(),
            completed: HashSet::new(),
            done: false,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.transport.node_id()
    }

    /// Enqueue a command the master addressed to itself.
    pub fn enqueue_local(&mut self, pkg: CommandPkg, deps: Vec<CommandId>) {
        self.local_queue.push_back((pkg, deps));
    }

    /// Whether the shutdown command has been consumed and every job has
    /// drained.
    pub fn is_finished(&self) -> bool {
        self.done && self.active.is_empty() && self.pending.is_empty()
    }

    /// Jobs currently alive (pending or active). Exposed for drain
    /// assertions in tests.
    pub fn live_jobs(&self) -> usize {
        self.active.len() + self.pending.len()
    }

    /// One iteration of the loop.
    pub fn tick(&mut self) -> Result<()> {
        self.transfers.poll()?;
        self.update_jobs()?;
        self.admit_ready_jobs()?;
        self.receive_command()
    }

    /// Run to completion. Only meaningful when every peer node is making
    /// progress concurrently (one process per node); single-process
    /// clusters interleave `tick` calls instead.
    pub fn run(&mut self) -> Result<()> {
        let span = tracing::debug_span!("executor", node = %self.node_id());
        let _guard = span.enter();
        while !self.is_finished() {
            self.tick()?;
        }
        debug!("executor drained");
        Ok(())
    }

    fn update_jobs(&mut self) -> Result<()> {
        let mut still_active = Vec::with_capacity(self.active.len());
        for mut job in std::mem::take(&mut self.active) {
            if job.update(&mut self.transfers, self.launcher.as_mut())? {
                trace!(cid = %job.cid(), kind = job.kind_name(), "job done");
                self.completed.insert(job.cid());
            } else {
                still_active.push(job);
            }
        }
        self.active = still_active;
        Ok(())
    }

    /// Start jobs whose dependencies have all reported done. A command
    /// with a dependency on D never starts before D's job completed.
    fn admit_ready_jobs(&mut self) -> Result<()> {
        let mut still_pending = Vec::with_capacity(self.pending.len());
        for pending in std::mem::take(&mut self.pending) {
            if pending.deps.iter().all(|dep| self.completed.contains(dep)) {
                self.active.push(Job::from_pkg(pending.pkg)?);
            } else {
                still_pending.push(pending);
            }
        }
        self.pending = still_pending;
        Ok(())
    }

    /// Take in at most one command package per tick.
    fn receive_command(&mut self) -> Result<()> {
        let received = if self.node_id().is_master() {
            self.local_queue.pop_front()
        } else {
            self.transport.try_recv_command()?
        };
        let Some((pkg, deps)) = received else {
            return Ok(());
        };

        if pkg.kind == wire::kind::SHUTDOWN {
            debug!(node = %self.node_id(), "shutdown received");
            self.done = true;
        } else {
            trace!(cid = pkg.cid, kind = pkg.kind, "command received");
            self.pending.push(PendingJob { pkg, deps });
        }
        Ok(())
    }
}
