//! Task lowering for the chorus runtime.
//!
//! The master node consumes tasks from a task graph in topological order
//! and lowers each one into per-node commands: compute / master-access
//! execution commands plus push / await-push transfer pairs. Along the
//! way it maintains, per buffer, a map from index-space regions to the
//! set of nodes holding a valid copy, so reads can be sourced from
//! whichever node last produced the data.
//!
//! Commands live in an arena keyed by [`CommandId`]; all dependency edges
//! are expressed as ids, never pointers. The push/await-push pair is the
//! only cross-node coupling and is matched by the push command's id, not
//! by an edge.

pub mod buffer_state;
pub mod command;
pub mod command_graph;
pub mod error;
pub mod generator;
pub mod ids;
pub mod split;
pub mod task;

#[cfg(test)]
pub mod test;

pub use buffer_state::BufferState;
pub use command::{Command, CommandDep, CommandKind};
pub use command_graph::CommandGraph;
pub use error::{Error, Result};
pub use generator::GraphGenerator;
pub use ids::{BufferId, ChunkId, CommandId, NodeId, TaskId};
pub use task::{AccessMode, MasterBufferAccess, RangeMapper, Task, TaskGraph};
