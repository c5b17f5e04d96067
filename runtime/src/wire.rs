//! Wire types: fixed-size command packages and data-transfer headers.
//!
//! A command message on [`TAG_CMD`] is a [`CommandPkg`] followed by the
//! command's dependency ids; a data message on [`TAG_DATA_TRANSFER`] is
//! a [`DataHeader`] followed by the linearised payload bytes, its size
//! inferred at probe time. Both structs are `repr(C)` PODs so a byte
//! round trip through the transport is exact.

use bytemuck::{Pod, Zeroable};

use chorus_graph::{BufferId, Command, CommandId, CommandKind, NodeId, TaskId};
use chorus_grid::{GridBox, Subrange};

use crate::error::{Result, UnexpectedCommandSnafu};

/// Message tag for command packages (small, blocking sends).
pub const TAG_CMD: u32 = 1;
/// Message tag for header + payload data transfers (asynchronous).
pub const TAG_DATA_TRANSFER: u32 = 2;

/// Sentinel `tid` for commands outside any task.
pub const TID_NONE: u64 = u64::MAX;

/// Command kind discriminants on the wire.
pub mod kind {
    pub const NOP: u32 = 0;
    pub const COMPUTE: u32 = 1;
    pub const MASTER_ACCESS: u32 = 2;
    pub const PUSH: u32 = 3;
    pub const AWAIT_PUSH: u32 = 4;
    pub const SHUTDOWN: u32 = 5;
}

/// Fixed-size command package.
///
/// Payload fields not used by a kind are zero; `tid` is [`TID_NONE`]
/// for commands outside any task.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct CommandPkg {
    pub tid: u64,
    pub cid: u64,
    pub kind: u32,
    pub _pad: u32,
    pub bid: u64,
    pub target_nid: u64,
    pub source_cid: u64,
    pub offset: [u64; 3],
    pub range: [u64; 3],
    pub global_size: [u64; 3],
}

impl CommandPkg {
    /// Package a command for the wire.
    pub fn from_command(cmd: &Command) -> Self {
        let mut pkg = Self::zeroed();
        pkg.tid = cmd.tid().map_or(TID_NONE, |t| t.0);
        pkg.cid = cmd.cid().0;
        match cmd.kind() {
            CommandKind::Nop => pkg.kind = kind::NOP,
            CommandKind::Compute { subrange } => {
                pkg.kind = kind::COMPUTE;
                pkg.offset = subrange.offset.map(|v| v as u64);
                pkg.range = subrange.range.map(|v| v as u64);
                pkg.global_size = subrange.global_size.map(|v| v as u64);
            }
            CommandKind::MasterAccess => pkg.kind = kind::MASTER_ACCESS,
            CommandKind::Push { bid, target, region_box } => {
                pkg.kind = kind::PUSH;
                pkg.bid = bid.0;
                pkg.target_nid = target.0;
                pkg.offset = region_box.min.map(|v| v as u64);
                pkg.range = box_extent(region_box);
            }
            CommandKind::AwaitPush { bid, source_cid, region_box } => {
                pkg.kind = kind::AWAIT_PUSH;
                pkg.bid = bid.0;
                pkg.source_cid = source_cid.0;
                pkg.offset = region_box.min.map(|v| v as u64);
                pkg.range = box_extent(region_box);
            }
            CommandKind::Shutdown => pkg.kind = kind::SHUTDOWN,
        }
        pkg
    }

    /// A shutdown package with a fresh command id.
    pub fn shutdown(cid: CommandId) -> Self {
        Self { tid: TID_NONE, cid: cid.0, kind: kind::SHUTDOWN, ..Self::zeroed() }
    }

    pub fn cid(&self) -> CommandId {
        CommandId(self.cid)
    }

    pub fn tid(&self) -> Option<TaskId> {
        (self.tid != TID_NONE).then_some(TaskId(self.tid))
    }

    pub fn bid(&self) -> BufferId {
        BufferId(self.bid)
    }

    /// Decode the kind-specific payload back into the command sum.
    pub fn decode(&self) -> Result<CommandKind> {
        let decoded = match self.kind {
            kind::NOP => CommandKind::Nop,
            kind::COMPUTE => CommandKind::Compute {
                subrange: Subrange::new(
                    self.offset.map(|v| v as usize),
                    self.range.map(|v| v as usize),
                    self.global_size.map(|v| v as usize),
                ),
            },
            kind::MASTER_ACCESS => CommandKind::MasterAccess,
            kind::PUSH => CommandKind::Push {
                bid: self.bid(),
                target: NodeId(self.target_nid),
                region_box: self.region_box(),
            },
            kind::AWAIT_PUSH => CommandKind::AwaitPush {
                bid: self.bid(),
                source_cid: CommandId(self.source_cid),
                region_box: self.region_box(),
            },
            kind::SHUTDOWN => CommandKind::Shutdown,
            other => return UnexpectedCommandSnafu { kind: other }.fail(),
        };
        Ok(decoded)
    }

    fn region_box(&self) -> GridBox {
        let min = self.offset.map(|v| v as usize);
        let mut max = [0; 3];
        for d in 0..3 {
            max[d] = min[d] + self.range[d] as usize;
        }
        GridBox::new(min, max)
    }

    pub fn to_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(bytes)
    }
}

/// Header preceding the payload of every data transfer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DataHeader {
    pub bid: u64,
    pub push_cid: u64,
    pub offset: [u64; 3],
    pub range: [u64; 3],
}

impl DataHeader {
    pub fn new(bid: BufferId, push_cid: CommandId, region_box: &GridBox) -> Self {
        Self {
            bid: bid.0,
            push_cid: push_cid.0,
            offset: region_box.min.map(|v| v as u64),
            range: box_extent(region_box),
        }
    }

    pub fn bid(&self) -> BufferId {
        BufferId(self.bid)
    }

    pub fn push_cid(&self) -> CommandId {
        CommandId(self.push_cid)
    }

    pub fn offset_usize(&self) -> [usize; 3] {
        self.offset.map(|v| v as usize)
    }

    pub fn range_usize(&self) -> [usize; 3] {
        self.range.map(|v| v as usize)
    }
}

fn box_extent(b: &GridBox) -> [u64; 3] {
    let mut extent = [0; 3];
    for d in 0..3 {
        extent[d] = (b.max[d] - b.min[d]) as u64;
    }
    extent
}
