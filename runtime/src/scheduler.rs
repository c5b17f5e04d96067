//! Master-side command dispatch.
//!
//! Walks the command graph in ascending command id — creation order is
//! a valid intra-node topological order because dependencies always
//! target lower ids — and ships every non-nop command to its node:
//! workers over the transport, the master through its local queue.
//! Afterwards each node, master included, receives exactly one
//! shutdown.

use tracing::debug;

use chorus_graph::{CommandGraph, CommandId, NodeId};

use crate::error::Result;
use crate::executor::Executor;
use crate::transport::Transport;
use crate::wire::CommandPkg;

/// Dispatch every command of a fully generated graph, then fan out
/// shutdowns. Runs on the master only.
pub fn dispatch(
    cdag: &mut CommandGraph,
    transport: &dyn Transport,
    master: &mut Executor,
) -> Result<()> {
    let mut packages: Vec<(NodeId, CommandPkg, Vec<CommandId>)> = Vec::new();
    for cmd in cdag.commands_in_creation_order() {
        if matches!(cmd.kind(), chorus_graph::CommandKind::Nop) {
            continue;
        }
        let deps: Vec<CommandId> = cmd.dependencies().iter().map(|d| d.cid).collect();
        packages.push((cmd.nid(), CommandPkg::from_command(cmd), deps));
    }

    let count = packages.len();
    for (nid, pkg, deps) in packages {
        if nid.is_master() {
            master.enqueue_local(pkg, deps);
        } else {
            transport.send_command(nid, &pkg, &deps)?;
        }
    }

    // One shutdown per node; the master's goes last through its queue.
    for n in 1..transport.num_nodes() as u64 {
        let pkg = CommandPkg::shutdown(cdag.allocate_cid());
        transport.send_command(NodeId(n), &pkg, &[])?;
    }
    master.enqueue_local(CommandPkg::shutdown(cdag.allocate_cid()), Vec::new());

    debug!(commands = count, nodes = transport.num_nodes(), "command graph dispatched");
    Ok(())
}
