//! Arena of commands with task and execution-front indices.
//!
//! Commands are owned by the graph and referenced by [`CommandId`]
//! everywhere; dependency edges are id pairs, so erasing a command never
//! dangles. Dependencies may only connect commands on the same node: the
//! push/await-push pair is the sole cross-node coupling, and it is
//! expressed by a matching command id, not an edge.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::command::{Command, CommandDep, CommandKind};
use crate::ids::{CommandId, NodeId, TaskId};

#[derive(Debug, Default)]
pub struct CommandGraph {
    next_cid: u64,
    commands: HashMap<CommandId, Command>,
    by_task: HashMap<TaskId, Vec<CommandId>>,
    /// Per-node commands with no dependents.
    execution_fronts: BTreeMap<NodeId, HashSet<CommandId>>,
    /// Grows when dependencies are added; never shrinks, and does not
    /// account for later changes further up the chain.
    max_pseudo_critical_path_length: u32,
}

impl CommandGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next command id and insert a command. Task-owned
    /// commands are indexed under their task; everything but a nop
    /// enters its node's execution front.
    pub fn create(&mut self, nid: NodeId, tid: Option<TaskId>, kind: CommandKind) -> CommandId {
        let cid = self.allocate_cid();
        let is_nop = matches!(kind, CommandKind::Nop);
        let cmd = Command::new(cid, nid, tid, kind);
        if let Some(tid) = tid {
            self.by_task.entry(tid).or_default().push(cid);
        }
        if !is_nop {
            self.execution_fronts.entry(nid).or_default().insert(cid);
        }
        self.commands.insert(cid, cmd);
        cid
    }

    /// Reserve a fresh command id without creating a command. The
    /// dispatcher uses this for shutdown packages, which never enter the
    /// graph.
    pub fn allocate_cid(&mut self) -> CommandId {
        let cid = CommandId(self.next_cid);
        self.next_cid += 1;
        cid
    }

    /// Panics if `cid` does not exist — operating on a non-existent
    /// command is a programmer error.
    pub fn get(&self, cid: CommandId) -> &Command {
        self.commands.get(&cid).unwrap_or_else(|| panic!("unknown command {cid}"))
    }

    pub fn contains(&self, cid: CommandId) -> bool {
        self.commands.contains_key(&cid)
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn task_command_count(&self, tid: TaskId) -> usize {
        self.by_task.get(&tid).map_or(0, Vec::len)
    }

    /// Commands owned by `tid`, in creation order.
    pub fn task_commands(&self, tid: TaskId) -> &[CommandId] {
        self.by_task.get(&tid).map_or(&[], Vec::as_slice)
    }

    pub fn all_commands(&self) -> impl Iterator<Item = &Command> {
        self.commands.values()
    }

    /// All commands sorted by id. Creation order is a valid intra-node
    /// topological order because dependencies always target lower ids.
    pub fn commands_in_creation_order(&self) -> Vec<&Command> {
        let mut cmds: Vec<&Command> = self.commands.values().collect();
        cmds.sort_unstable_by_key(|c| c.cid());
        cmds
    }

    /// Current per-node leaves, sorted by id for deterministic walks.
    pub fn execution_front(&self, nid: NodeId) -> Vec<CommandId> {
        let mut front: Vec<CommandId> =
            self.execution_fronts.get(&nid).into_iter().flatten().copied().collect();
        front.sort_unstable();
        front
    }

    /// Record that `depender` must run after `dependee`.
    ///
    /// Both must exist, be distinct and live on the same node. The
    /// dependee leaves the execution front; the depender's
    /// pseudo-critical-path length (and the graph maximum) only ever
    /// grows.
    pub fn add_dependency(&mut self, depender: CommandId, dependee: CommandId, is_anti: bool) {
        assert_ne!(depender, dependee, "command {depender} cannot depend on itself");
        let (dep_nid, dep_length) = {
            let dependee = self.get(dependee);
            (dependee.nid(), dependee.pseudo_critical_path_length())
        };
        let cmd = self.commands.get_mut(&depender).unwrap_or_else(|| panic!("unknown command {depender}"));
        assert_eq!(cmd.nid(), dep_nid, "commands cannot depend on commands executed on another node");

        if !cmd.dependencies().iter().any(|d| d.cid == dependee) {
            cmd.push_dep(CommandDep { cid: dependee, is_anti });
            cmd.raise_pseudo_critical_path(dep_length);
        }
        let length = cmd.pseudo_critical_path_length();
        self.execution_fronts.entry(dep_nid).or_default().remove(&dependee);
        self.max_pseudo_critical_path_length = self.max_pseudo_critical_path_length.max(length);
    }

    /// Drop the edge between `depender` and `dependee`. Symmetric with
    /// [`add_dependency`](Self::add_dependency): a dependee that loses
    /// its last dependent becomes a leaf again and rejoins its node's
    /// execution front.
    pub fn remove_dependency(&mut self, depender: CommandId, dependee: CommandId) {
        let cmd = self.commands.get_mut(&depender).unwrap_or_else(|| panic!("unknown command {depender}"));
        cmd.remove_dep(dependee);

        let dependee_cmd = self.get(dependee);
        if matches!(dependee_cmd.kind(), CommandKind::Nop) {
            return;
        }
        let nid = dependee_cmd.nid();
        let has_dependents = self
            .commands
            .values()
            .any(|c| c.dependencies().iter().any(|d| d.cid == dependee));
        if !has_dependents {
            self.execution_fronts.entry(nid).or_default().insert(dependee);
        }
    }

    /// Remove a command from the arena and every index.
    pub fn erase(&mut self, cid: CommandId) {
        let cmd = self.commands.remove(&cid).unwrap_or_else(|| panic!("unknown command {cid}"));
        if let Some(tid) = cmd.tid()
            && let Some(cids) = self.by_task.get_mut(&tid)
        {
            cids.retain(|c| *c != cid);
            if cids.is_empty() {
                self.by_task.remove(&tid);
            }
        }
        if let Some(front) = self.execution_fronts.get_mut(&cmd.nid()) {
            front.remove(&cid);
        }
    }

    pub fn max_pseudo_critical_path_length(&self) -> u32 {
        self.max_pseudo_critical_path_length
    }

    /// Log the whole graph, one line per command.
    pub fn trace_graph(&self) {
        for cmd in self.commands_in_creation_order() {
            let deps: Vec<String> = cmd
                .dependencies()
                .iter()
                .map(|d| if d.is_anti { format!("{}(anti)", d.cid) } else { d.cid.to_string() })
                .collect();
            debug!(
                cid = %cmd.cid(),
                nid = %cmd.nid(),
                tid = ?cmd.tid(),
                kind = cmd.kind().name(),
                deps = deps.join(","),
                "command"
            );
        }
    }
}
