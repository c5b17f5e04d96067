//! The message-transport contract.
//!
//! The runtime is written against this trait; the production backend
//! (an MPI-style messaging layer) lives with the hosting process. The
//! transport is initialised in a funnelled threading mode: only the
//! thread owning the runtime may call it, so implementations are free to
//! use interior mutability without locks.
//!
//! Two message classes exist. Command packages are small and sent
//! blocking on [`TAG_CMD`](crate::wire::TAG_CMD); data transfers are
//! asynchronous header + payload composites on
//! [`TAG_DATA_TRANSFER`](crate::wire::TAG_DATA_TRANSFER), posted and
//! then completed through id-based tests. Delivery is reliable and in
//! order, the node set is fixed, and any fault is fatal.

pub mod local;

use chorus_graph::{CommandId, NodeId};

use crate::error::Result;
use crate::wire::{CommandPkg, DataHeader};

/// Identifies an outstanding asynchronous data send.
pub type DataSendId = u64;
/// Identifies an outstanding asynchronous data receive.
pub type DataRecvId = u64;

pub trait Transport {
    fn num_nodes(&self) -> usize;

    fn node_id(&self) -> NodeId;

    /// Blocking send of a command package and its dependency ids.
    /// Packages are small enough that blocking is cheaper than keeping
    /// the buffer alive for an asynchronous send.
    fn send_command(&self, target: NodeId, pkg: &CommandPkg, deps: &[CommandId]) -> Result<()>;

    /// Non-blocking probe for a command message; receives it whole when
    /// one is available.
    fn try_recv_command(&self) -> Result<Option<(CommandPkg, Vec<CommandId>)>>;

    /// Post an asynchronous data send. The payload is owned by the
    /// transport until [`test_data_send`](Self::test_data_send) reports
    /// completion.
    fn post_data_send(&self, target: NodeId, header: DataHeader, payload: Vec<u8>)
    -> Result<DataSendId>;

    /// Whether an outstanding send has completed.
    fn test_data_send(&self, id: DataSendId) -> Result<bool>;

    /// Probe for an incoming data message and, if one is pending, post
    /// an asynchronous receive for it.
    fn try_recv_data(&self) -> Result<Option<DataRecvId>>;

    /// Whether an outstanding receive has completed; yields the header
    /// and payload exactly once.
    fn test_data_recv(&self, id: DataRecvId) -> Result<Option<(DataHeader, Vec<u8>)>>;
}
