//! Asynchronous buffer-region transfers.
//!
//! A push reads its box out of local storage and posts an asynchronous
//! send; the matching await-push registers interest under the push's
//! command id. The blackboard rendezvous the two: whichever side shows
//! up first parks its half, and `poll` completes handles as the
//! transport makes progress. The order of "data arrives" and
//! "await-push posted" does not matter.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::info;

use chorus_graph::{CommandId, CommandKind};

use crate::error::{Result, UnexpectedCommandSnafu};
use crate::storage::BufferStorage;
use crate::transport::{DataRecvId, DataSendId, Transport};
use crate::wire::{CommandPkg, DataHeader};

/// Completion state shared between a job and the transfer manager.
///
/// For an incoming transfer that arrives before its await-push, the
/// received data is parked here until the waiter shows up.
#[derive(Debug, Default)]
pub struct TransferHandle {
    pub complete: bool,
    transfer: Option<(DataHeader, Vec<u8>)>,
}

pub type SharedTransferHandle = Rc<RefCell<TransferHandle>>;

pub struct TransferManager {
    transport: Rc<dyn Transport>,
    storage: Rc<RefCell<BufferStorage>>,
    incoming: Vec<DataRecvId>,
    outgoing: Vec<(DataSendId, SharedTransferHandle)>,
    /// Rendezvous table keyed by the producing push's command id.
    blackboard: HashMap<CommandId, SharedTransferHandle>,
}

impl TransferManager {
    pub fn new(transport: Rc<dyn Transport>, storage: Rc<RefCell<BufferStorage>>) -> Self {
        Self {
            transport,
            storage,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            blackboard: HashMap::new(),
        }
    }

    /// Start an outgoing transfer for a push command. The returned
    /// handle completes when the send completes.
    pub fn push(&mut self, pkg: &CommandPkg) -> Result<SharedTransferHandle> {
        let CommandKind::Push { bid, target, region_box } = pkg.decode()? else {
            return UnexpectedCommandSnafu { kind: pkg.kind }.fail();
        };

        let mut extent = [0; 3];
        for d in 0..3 {
            extent[d] = region_box.max[d] - region_box.min[d];
        }
        let data = self.storage.borrow().get_data(bid, region_box.min, extent)?;
        let size = data.linearized_data_size();

        let header = DataHeader::new(bid, pkg.cid(), &region_box);
        let send_id = self.transport.post_data_send(target, header, data.into_bytes())?;

        let handle = SharedTransferHandle::default();
        self.outgoing.push((send_id, Rc::clone(&handle)));
        info!(%bid, %target, size, push_cid = %pkg.cid(), "sending outgoing data");
        Ok(handle)
    }

    /// Register interest in the data sent by `source_cid`'s push. If the
    /// transfer has already been fully received, it is written to
    /// storage now and the returned handle is complete.
    pub fn await_push(&mut self, pkg: &CommandPkg) -> Result<SharedTransferHandle> {
        let CommandKind::AwaitPush { bid, source_cid, region_box } = pkg.decode()? else {
            return UnexpectedCommandSnafu { kind: pkg.kind }.fail();
        };

        if let Some(handle) = self.blackboard.remove(&source_cid) {
            let parked = handle.borrow_mut().transfer.take();
            let (header, payload) = parked.expect("a parked transfer always carries its data");
            debug_assert_eq!(header.bid(), bid);
            debug_assert_eq!(header.offset_usize(), region_box.min);
            self.write_to_storage(header, payload)?;
            Ok(handle)
        } else {
            let handle = SharedTransferHandle::default();
            self.blackboard.insert(source_cid, Rc::clone(&handle));
            Ok(handle)
        }
    }

    /// Non-blocking progress on all outstanding transfers.
    pub fn poll(&mut self) -> Result<()> {
        self.probe_incoming()?;
        self.update_incoming()?;
        self.update_outgoing()
    }

    /// Probe the transport for a newly arrived data message.
    fn probe_incoming(&mut self) -> Result<()> {
        if let Some(recv_id) = self.transport.try_recv_data()? {
            self.incoming.push(recv_id);
        }
        Ok(())
    }

    fn update_incoming(&mut self) -> Result<()> {
        let mut still_incoming = Vec::with_capacity(self.incoming.len());
        for recv_id in std::mem::take(&mut self.incoming) {
            let Some((header, payload)) = self.transport.test_data_recv(recv_id)? else {
                still_incoming.push(recv_id);
                continue;
            };
            info!(bid = header.bid, push_cid = header.push_cid, size = payload.len(),
                "received incoming data");

            if let Some(handle) = self.blackboard.remove(&header.push_cid()) {
                // The await-push got here first; hand the data over.
                self.write_to_storage(header, payload)?;
                handle.borrow_mut().complete = true;
            } else {
                // No waiter yet; park the transfer until it shows up.
                let handle = SharedTransferHandle::default();
                {
                    let mut parked = handle.borrow_mut();
                    parked.complete = true;
                    parked.transfer = Some((header, payload));
                }
                self.blackboard.insert(header.push_cid(), handle);
            }
        }
        self.incoming = still_incoming;
        Ok(())
    }

    fn update_outgoing(&mut self) -> Result<()> {
        let mut still_outgoing = Vec::with_capacity(self.outgoing.len());
        for (send_id, handle) in std::mem::take(&mut self.outgoing) {
            if self.transport.test_data_send(send_id)? {
                handle.borrow_mut().complete = true;
            } else {
                still_outgoing.push((send_id, handle));
            }
        }
        self.outgoing = still_outgoing;
        Ok(())
    }

    fn write_to_storage(&mut self, header: DataHeader, payload: Vec<u8>) -> Result<()> {
        self.storage.borrow_mut().set_data(
            header.bid(),
            header.offset_usize(),
            header.range_usize(),
            &payload,
        )
    }
}
