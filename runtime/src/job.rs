//! Jobs: the per-node execution of received commands.
//!
//! One job per command, modelled as a tagged sum. Jobs are cooperative:
//! `update` must not block, and long-running device work is owned by
//! the launcher, which hands back a [`CompletionFlag`] the job tests on
//! every update. A job's real work starts lazily on its first update,
//! which the executor only issues once the job's dependencies are done.

use std::cell::Cell;
use std::rc::Rc;

use chorus_graph::{CommandKind, TaskId};
use chorus_grid::Subrange;

use crate::error::{Result, UnexpectedCommandSnafu};
use crate::transfer::{SharedTransferHandle, TransferManager};
use crate::wire::CommandPkg;

/// Shared completion flag flipped by the device side when asynchronous
/// work finishes.
#[derive(Debug, Clone, Default)]
pub struct CompletionFlag(Rc<Cell<bool>>);

impl CompletionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag that is already set, for synchronous work.
    pub fn finished() -> Self {
        let flag = Self::new();
        flag.finish();
        flag
    }

    pub fn finish(&self) {
        self.0.set(true);
    }

    pub fn is_set(&self) -> bool {
        self.0.get()
    }
}

/// The kernel-launcher contract (external collaborator).
///
/// Implementations receive chunked subranges and run them on whatever
/// accelerator backs this node; both calls return promptly and signal
/// completion through the returned flag.
pub trait KernelLauncher {
    fn launch_compute(&mut self, tid: TaskId, chunk: &Subrange<3>) -> Result<CompletionFlag>;

    fn run_master_access(&mut self, tid: TaskId) -> Result<CompletionFlag>;
}

enum JobState {
    Push { handle: Option<SharedTransferHandle> },
    AwaitPush { handle: Option<SharedTransferHandle> },
    Compute { flag: Option<CompletionFlag> },
    MasterAccess { flag: Option<CompletionFlag> },
}

/// An active command on this node.
pub struct Job {
    pkg: CommandPkg,
    state: JobState,
}

impl Job {
    /// Instantiate the job for a received package. Shutdown never
    /// becomes a job; the executor consumes it directly.
    pub fn from_pkg(pkg: CommandPkg) -> Result<Self> {
        let state = match pkg.decode()? {
            CommandKind::Push { .. } => JobState::Push { handle: None },
            CommandKind::AwaitPush { .. } => JobState::AwaitPush { handle: None },
            CommandKind::Compute { .. } => JobState::Compute { flag: None },
            CommandKind::MasterAccess => JobState::MasterAccess { flag: None },
            CommandKind::Nop | CommandKind::Shutdown => {
                return UnexpectedCommandSnafu { kind: pkg.kind }.fail();
            }
        };
        Ok(Self { pkg, state })
    }

    pub fn cid(&self) -> chorus_graph::CommandId {
        self.pkg.cid()
    }

    pub fn kind_name(&self) -> &'static str {
        match self.state {
            JobState::Push { .. } => "push",
            JobState::AwaitPush { .. } => "await_push",
            JobState::Compute { .. } => "compute",
            JobState::MasterAccess { .. } => "master_access",
        }
    }

    /// Drive the job one step; returns whether it is done. The first
    /// update performs the actual hand-off (transfer start, kernel
    /// launch); later updates only test completion.
    pub fn update(
        &mut self,
        transfers: &mut TransferManager,
        launcher: &mut dyn KernelLauncher,
    ) -> Result<bool> {
        match &mut self.state {
            JobState::Push { handle } => {
                if handle.is_none() {
                    *handle = Some(transfers.push(&self.pkg)?);
                }
                Ok(handle.as_ref().expect("handle set above").borrow().complete)
            }
            JobState::AwaitPush { handle } => {
                if handle.is_none() {
                    *handle = Some(transfers.await_push(&self.pkg)?);
                }
                Ok(handle.as_ref().expect("handle set above").borrow().complete)
            }
            JobState::Compute { flag } => {
                if flag.is_none() {
                    let CommandKind::Compute { subrange } = self.pkg.decode()? else {
                        return UnexpectedCommandSnafu { kind: self.pkg.kind }.fail();
                    };
                    let tid = self.pkg.tid().expect("compute commands belong to a task");
                    *flag = Some(launcher.launch_compute(tid, &subrange)?);
                }
                Ok(flag.as_ref().expect("flag set above").is_set())
            }
            JobState::MasterAccess { flag } => {
                if flag.is_none() {
                    let tid = self.pkg.tid().expect("master-access commands belong to a task");
                    *flag = Some(launcher.run_master_access(tid)?);
                }
                Ok(flag.as_ref().expect("flag set above").is_set())
            }
        }
    }
}
