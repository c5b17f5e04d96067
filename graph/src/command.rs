//! Commands: per-node execution units lowered from tasks and transfers.

use chorus_grid::{GridBox, Subrange};
use smallvec::SmallVec;

use crate::ids::{BufferId, CommandId, NodeId, TaskId};

/// A dependency edge to another command on the same node.
///
/// `is_anti` marks write-after-read ordering. The flag is carried on
/// every edge but the generator never sets it yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDep {
    pub cid: CommandId,
    pub is_anti: bool,
}

/// Kind-specific command payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// Structural placeholder; never enters an execution front and is
    /// never dispatched.
    Nop,
    /// Run a kernel chunk over the given subrange.
    Compute { subrange: Subrange<3> },
    /// Run the task's closure on the master node.
    MasterAccess,
    /// Send a buffer box to `target`.
    Push {
        bid: BufferId,
        target: NodeId,
        region_box: GridBox,
    },
    /// Wait for the data sent by the push with id `source_cid`.
    AwaitPush {
        bid: BufferId,
        source_cid: CommandId,
        region_box: GridBox,
    },
    /// Graceful termination signal.
    Shutdown,
}

impl CommandKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Compute { .. } => "compute",
            Self::MasterAccess => "master_access",
            Self::Push { .. } => "push",
            Self::AwaitPush { .. } => "await_push",
            Self::Shutdown => "shutdown",
        }
    }
}

/// A command: common header plus kind-specific payload.
#[derive(Debug)]
pub struct Command {
    cid: CommandId,
    nid: NodeId,
    tid: Option<TaskId>,
    kind: CommandKind,
    deps: SmallVec<[CommandDep; 4]>,
    pseudo_critical_path_length: u32,
}

impl Command {
    pub(crate) fn new(cid: CommandId, nid: NodeId, tid: Option<TaskId>, kind: CommandKind) -> Self {
        Self { cid, nid, tid, kind, deps: SmallVec::new(), pseudo_critical_path_length: 0 }
    }

    pub fn cid(&self) -> CommandId {
        self.cid
    }

    pub fn nid(&self) -> NodeId {
        self.nid
    }

    /// The owning task, or `None` for commands outside any task (e.g.
    /// shutdown).
    pub fn tid(&self) -> Option<TaskId> {
        self.tid
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn dependencies(&self) -> &[CommandDep] {
        &self.deps
    }

    /// Upper bound on the longest dependency chain ending here. Never
    /// decreases; used only as a heuristic.
    pub fn pseudo_critical_path_length(&self) -> u32 {
        self.pseudo_critical_path_length
    }

    pub(crate) fn push_dep(&mut self, dep: CommandDep) {
        self.deps.push(dep);
    }

    pub(crate) fn remove_dep(&mut self, cid: CommandId) {
        self.deps.retain(|d| d.cid != cid);
    }

    pub(crate) fn raise_pseudo_critical_path(&mut self, dependee_length: u32) {
        self.pseudo_critical_path_length = self.pseudo_critical_path_length.max(dependee_length + 1);
    }
}
