//! Per-node host-side buffer storage.
//!
//! Each node owns the bytes of every registered buffer and copies boxes
//! in and out in row-major order. Only the node's executor touches its
//! storage; cross-node movement goes through the transfer manager.

use std::collections::HashMap;

use snafu::ensure;

use chorus_graph::BufferId;

use crate::error::{Result, SizeMismatchSnafu, StorageBoundsSnafu};

struct HostBuffer {
    range: [usize; 3],
    elem_size: usize,
    data: Vec<u8>,
}

/// A linearised copy of a buffer box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearizedData {
    bytes: Vec<u8>,
}

impl LinearizedData {
    pub fn linearized_data_size(&self) -> usize {
        self.bytes.len()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// All buffers owned by one node.
#[derive(Default)]
pub struct BufferStorage {
    buffers: HashMap<BufferId, HostBuffer>,
}

impl BufferStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate zero-filled storage for a new buffer.
    pub fn register(&mut self, bid: BufferId, range: [usize; 3], elem_size: usize) {
        let total = range.iter().product::<usize>() * elem_size;
        let previous =
            self.buffers.insert(bid, HostBuffer { range, elem_size, data: vec![0; total] });
        assert!(previous.is_none(), "buffer {bid} registered twice");
    }

    pub fn is_registered(&self, bid: BufferId) -> bool {
        self.buffers.contains_key(&bid)
    }

    /// Copy a box out of the buffer, row-major.
    pub fn get_data(
        &self,
        bid: BufferId,
        offset: [usize; 3],
        range: [usize; 3],
    ) -> Result<LinearizedData> {
        let buf = self.buffer(bid)?;
        check_bounds(bid, buf, offset, range)?;

        let elem = buf.elem_size;
        let row = range[2] * elem;
        let mut bytes = Vec::with_capacity(range.iter().product::<usize>() * elem);
        for x in 0..range[0] {
            for y in 0..range[1] {
                let start = linear_index(buf, [offset[0] + x, offset[1] + y, offset[2]]) * elem;
                bytes.extend_from_slice(&buf.data[start..start + row]);
            }
        }
        Ok(LinearizedData { bytes })
    }

    /// Overwrite a box of the buffer with linearised bytes.
    pub fn set_data(
        &mut self,
        bid: BufferId,
        offset: [usize; 3],
        range: [usize; 3],
        bytes: &[u8],
    ) -> Result<()> {
        let buf = self.buffers.get_mut(&bid).ok_or(crate::error::Error::UnknownBuffer { bid })?;
        check_bounds(bid, buf, offset, range)?;

        let elem = buf.elem_size;
        let expected = range.iter().product::<usize>() * elem;
        ensure!(bytes.len() == expected, SizeMismatchSnafu { expected, actual: bytes.len() });

        let row = range[2] * elem;
        let mut cursor = 0;
        for x in 0..range[0] {
            for y in 0..range[1] {
                let start = linear_index(buf, [offset[0] + x, offset[1] + y, offset[2]]) * elem;
                buf.data[start..start + row].copy_from_slice(&bytes[cursor..cursor + row]);
                cursor += row;
            }
        }
        Ok(())
    }

    fn buffer(&self, bid: BufferId) -> Result<&HostBuffer> {
        self.buffers.get(&bid).ok_or(crate::error::Error::UnknownBuffer { bid })
    }
}

fn check_bounds(bid: BufferId, buf: &HostBuffer, offset: [usize; 3], range: [usize; 3]) -> Result<()> {
    let inside = (0..3).all(|d| offset[d] + range[d] <= buf.range[d]);
    ensure!(inside, StorageBoundsSnafu { bid, offset, range });
    Ok(())
}

fn linear_index(buf: &HostBuffer, point: [usize; 3]) -> usize {
    (point[0] * buf.range[1] + point[1]) * buf.range[2] + point[2]
}
