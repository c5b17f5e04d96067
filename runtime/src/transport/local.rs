//! In-process loopback transport.
//!
//! A [`LocalCluster`] holds one mailbox pair per node behind a shared
//! `Rc<RefCell<..>>`; each node's [`LocalTransport`] is a view into it.
//! Everything is `!Send` by construction, matching the runtime's
//! single-threaded model — multi-node clusters are driven by
//! interleaving executor ticks in one thread.
//!
//! Data receives complete only after `delivery_delay` completion tests,
//! so tests can exercise both rendezvous orders: data arriving before
//! the await-push is posted, and after.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use chorus_graph::{CommandId, NodeId};

use crate::error::{Result, TransportSnafu};
use crate::transport::{DataRecvId, DataSendId, Transport};
use crate::wire::{CommandPkg, DataHeader};

struct DataMsg {
    header: DataHeader,
    payload: Vec<u8>,
    send_id: DataSendId,
}

struct PostedRecv {
    header: DataHeader,
    payload: Vec<u8>,
    send_id: DataSendId,
    /// Completion tests remaining before the receive finishes.
    remaining: u32,
}

struct ClusterState {
    num_nodes: usize,
    delivery_delay: u32,
    cmd_queues: Vec<VecDeque<(CommandPkg, Vec<CommandId>)>>,
    data_queues: Vec<VecDeque<DataMsg>>,
    next_transfer_id: u64,
    /// Sends complete once their message has been fully received.
    completed_sends: HashMap<DataSendId, bool>,
    posted_recvs: HashMap<DataRecvId, PostedRecv>,
}

/// A single-process cluster of loopback mailboxes.
pub struct LocalCluster {
    state: Rc<RefCell<ClusterState>>,
}

impl LocalCluster {
    pub fn new(num_nodes: usize) -> Self {
        Self::with_delivery_delay(num_nodes, 0)
    }

    /// A cluster whose data receives take `delivery_delay` extra
    /// completion tests to finish.
    pub fn with_delivery_delay(num_nodes: usize, delivery_delay: u32) -> Self {
        assert!(num_nodes > 0, "a cluster has at least the master node");
        let state = ClusterState {
            num_nodes,
            delivery_delay,
            cmd_queues: (0..num_nodes).map(|_| VecDeque::new()).collect(),
            data_queues: (0..num_nodes).map(|_| VecDeque::new()).collect(),
            next_transfer_id: 0,
            completed_sends: HashMap::new(),
            posted_recvs: HashMap::new(),
        };
        Self { state: Rc::new(RefCell::new(state)) }
    }

    /// The transport endpoint for one node.
    pub fn transport(&self, node: NodeId) -> LocalTransport {
        assert!((node.0 as usize) < self.state.borrow().num_nodes, "unknown node {node}");
        LocalTransport { node, state: Rc::clone(&self.state) }
    }
}

/// One node's view of a [`LocalCluster`].
pub struct LocalTransport {
    node: NodeId,
    state: Rc<RefCell<ClusterState>>,
}

impl LocalTransport {
    fn check_target(&self, target: NodeId) -> Result<usize> {
        let idx = target.0 as usize;
        if idx >= self.state.borrow().num_nodes {
            return TransportSnafu { reason: format!("unknown target node {target}") }.fail();
        }
        Ok(idx)
    }
}

impl Transport for LocalTransport {
    fn num_nodes(&self) -> usize {
        self.state.borrow().num_nodes
    }

    fn node_id(&self) -> NodeId {
        self.node
    }

    fn send_command(&self, target: NodeId, pkg: &CommandPkg, deps: &[CommandId]) -> Result<()> {
        let idx = self.check_target(target)?;
        self.state.borrow_mut().cmd_queues[idx].push_back((*pkg, deps.to_vec()));
        Ok(())
    }

    fn try_recv_command(&self) -> Result<Option<(CommandPkg, Vec<CommandId>)>> {
        Ok(self.state.borrow_mut().cmd_queues[self.node.0 as usize].pop_front())
    }

    fn post_data_send(
        &self,
        target: NodeId,
        header: DataHeader,
        payload: Vec<u8>,
    ) -> Result<DataSendId> {
        let idx = self.check_target(target)?;
        let mut state = self.state.borrow_mut();
        let id = state.next_transfer_id;
        state.next_transfer_id += 1;
        state.completed_sends.insert(id, false);
        state.data_queues[idx].push_back(DataMsg { header, payload, send_id: id });
        Ok(id)
    }

    fn test_data_send(&self, id: DataSendId) -> Result<bool> {
        let state = self.state.borrow();
        match state.completed_sends.get(&id) {
            Some(done) => Ok(*done),
            None => TransportSnafu { reason: format!("unknown send {id}") }.fail(),
        }
    }

    fn try_recv_data(&self) -> Result<Option<DataRecvId>> {
        let mut state = self.state.borrow_mut();
        let Some(msg) = state.data_queues[self.node.0 as usize].pop_front() else {
            return Ok(None);
        };
        let id = state.next_transfer_id;
        state.next_transfer_id += 1;
        let remaining = state.delivery_delay;
        state.posted_recvs.insert(
            id,
            PostedRecv { header: msg.header, payload: msg.payload, send_id: msg.send_id, remaining },
        );
        Ok(Some(id))
    }

    fn test_data_recv(&self, id: DataRecvId) -> Result<Option<(DataHeader, Vec<u8>)>> {
        let mut state = self.state.borrow_mut();
        let Some(recv) = state.posted_recvs.get_mut(&id) else {
            return TransportSnafu { reason: format!("unknown receive {id}") }.fail();
        };
        if recv.remaining > 0 {
            recv.remaining -= 1;
            return Ok(None);
        }
        let recv = state.posted_recvs.remove(&id).expect("presence checked above");
        // The sender's buffer is free once the message is out of flight.
        state.completed_sends.insert(recv.send_id, true);
        Ok(Some((recv.header, recv.payload)))
    }
}
