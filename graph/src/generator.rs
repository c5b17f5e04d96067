//! Lowering satisfied tasks into per-node commands.
//!
//! One task at a time: chunk the iteration space, work out per-chunk
//! buffer requirements through the range mappers, look up which nodes
//! hold the data, assign chunks to nodes, emit execution commands wired
//! to their prerequisites, emit push/await-push pairs for reads the
//! executing node cannot satisfy locally, and finally fold the task's
//! writes back into the per-buffer validity map.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chorus_grid::{GridBox, GridRegion, Subrange};
use snafu::{OptionExt, ensure};
use tracing::debug;

use crate::buffer_state::BufferState;
use crate::command::CommandKind;
use crate::command_graph::CommandGraph;
use crate::error::{NoFreeNodesSnafu, Result, UnknownBufferSnafu};
use crate::ids::{BufferId, ChunkId, CommandId, NodeId, TaskId};
use crate::split;
use crate::task::{AccessMode, Task, TaskGraph};

/// Merged read/write regions one chunk needs on one buffer.
#[derive(Debug, Default, Clone)]
struct Requirements {
    read: GridRegion,
    write: GridRegion,
}

/// Boxes tiling a chunk's read region, tagged with the nodes holding a
/// valid copy.
type SourceCover = Vec<(GridBox, BTreeSet<NodeId>)>;

pub struct GraphGenerator {
    num_nodes: usize,
    cdag: CommandGraph,
    buffer_states: HashMap<BufferId, BufferState>,
}

impl GraphGenerator {
    pub fn new(num_nodes: usize) -> Self {
        assert!(num_nodes > 0, "a cluster has at least the master node");
        Self { num_nodes, cdag: CommandGraph::new(), buffer_states: HashMap::new() }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Track validity for a new buffer. Host-initialised buffers start
    /// valid everywhere.
    pub fn register_buffer(&mut self, bid: BufferId, range: [usize; 3], host_initialized: bool) {
        let state = BufferState::new(range, host_initialized, self.num_nodes);
        let previous = self.buffer_states.insert(bid, state);
        assert!(previous.is_none(), "buffer {bid} registered twice");
    }

    pub fn command_graph(&self) -> &CommandGraph {
        &self.cdag
    }

    pub fn command_graph_mut(&mut self) -> &mut CommandGraph {
        &mut self.cdag
    }

    pub fn buffer_state(&self, bid: BufferId) -> Option<&BufferState> {
        self.buffer_states.get(&bid)
    }

    /// Drain the task graph: lower every satisfied task until none is
    /// left. Tasks become satisfied as their predecessors are marked
    /// processed, so this visits the whole graph in topological order.
    pub fn build_command_graph(&mut self, task_graph: &mut TaskGraph) -> Result<()> {
        while let Some(tid) = task_graph.get_satisfied_task() {
            self.process_task(tid, task_graph)?;
            task_graph.mark_task_as_processed(tid);
        }
        Ok(())
    }

    fn process_task(&mut self, tid: TaskId, task_graph: &TaskGraph) -> Result<()> {
        let task = task_graph.get_task(tid);

        // Steps 1 + 2: chunk the iteration space and collect per-chunk
        // buffer requirements, keyed by chunk id. A master-access task
        // is a single chunk pinned to the master, with no iteration
        // subrange.
        let (chunks, requirements) = match task {
            Task::Compute { dimensions, global_size, range_mappers } => {
                let num_chunks = self.num_nodes.saturating_sub(1).max(1);
                let chunks = split::split_task(*dimensions, *global_size, num_chunks)?;

                let mut requirements: BTreeMap<ChunkId, BTreeMap<BufferId, Requirements>> =
                    (0..chunks.len()).map(|i| (ChunkId(i), BTreeMap::new())).collect();
                for (bid, mappers) in range_mappers {
                    for mapper in mappers {
                        for (i, chunk) in chunks.iter().enumerate() {
                            let region = mapper.apply(chunk, *dimensions).to_region();
                            let reqs = requirements.entry(ChunkId(i)).or_default();
                            merge_requirement(reqs, *bid, mapper.mode(), &region);
                        }
                    }
                }
                (chunks.into_iter().map(Some).collect::<Vec<_>>(), requirements)
            }
            Task::MasterAccess { accesses } => {
                let mut requirements = BTreeMap::from([(ChunkId(0), BTreeMap::new())]);
                for access in accesses {
                    let region = access.subrange().to_region();
                    let reqs = requirements.entry(ChunkId(0)).or_default();
                    merge_requirement(reqs, access.bid, access.mode, &region);
                }
                (vec![None], requirements)
            }
        };

        // Step 3: which nodes hold each chunk's read data.
        let mut chunk_sources: BTreeMap<ChunkId, BTreeMap<BufferId, SourceCover>> = BTreeMap::new();
        for (chunk_id, reqs) in &requirements {
            let mut sources = BTreeMap::new();
            for (bid, req) in reqs {
                if req.read.is_empty() {
                    continue;
                }
                let state = self.buffer_states.get(bid).context(UnknownBufferSnafu { bid: *bid })?;
                sources.insert(*bid, state.get_source_nodes(&req.read));
            }
            chunk_sources.insert(*chunk_id, sources);
        }

        // Step 4: greedy chunk-to-node assignment.
        let chunk_nodes = self.assign_chunks_to_nodes(tid, &chunks, &requirements, &chunk_sources)?;

        // Steps 5 + 6, per chunk: first the push/await-push pairs for
        // reads the executing node cannot satisfy locally, then the
        // execution command depending on them. Transfers come first so
        // that, per node, creation order stays a valid dispatch order
        // (dependencies always target lower command ids). The pair
        // rendezvous via the push's command id; there is never a
        // cross-node edge.
        //
        // Prerequisite anchoring uses a per-node snapshot of the fronts
        // taken before this task emits anything: commands emitted for
        // this task prune the live front as edges are added, and a later
        // chunk on the same node must still see the predecessor's writer.
        let predecessors = task_graph.dependencies_of(tid);
        let front_snapshot: BTreeMap<NodeId, Vec<CommandId>> = (0..self.num_nodes as u64)
            .map(NodeId)
            .map(|nid| {
                let anchors: Vec<CommandId> = self
                    .cdag
                    .execution_front(nid)
                    .into_iter()
                    .filter(|cid| {
                        self.cdag.get(*cid).tid().is_some_and(|t| predecessors.contains(&t))
                    })
                    .collect();
                (nid, anchors)
            })
            .collect();
        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_id = ChunkId(i);
            let nid = chunk_nodes[&chunk_id];

            let mut await_cids = Vec::new();
            for (bid, req) in &requirements[&chunk_id] {
                if req.read.is_empty() {
                    continue;
                }
                for (region_box, owners) in &chunk_sources[&chunk_id][bid] {
                    if owners.contains(&nid) {
                        // Data already present; replicas are not tracked,
                        // so this stays pessimistic for third parties.
                        continue;
                    }
                    let source_nid = *owners.first().expect("source covers carry non-empty node sets");
                    let push_cid = self.cdag.create(
                        source_nid,
                        Some(tid),
                        CommandKind::Push { bid: *bid, target: nid, region_box: *region_box },
                    );
                    self.attach_to_anchors(push_cid, source_nid, &front_snapshot);

                    let await_cid = self.cdag.create(
                        nid,
                        Some(tid),
                        CommandKind::AwaitPush {
                            bid: *bid,
                            source_cid: push_cid,
                            region_box: *region_box,
                        },
                    );
                    await_cids.push(await_cid);
                    debug!(
                        %tid, %bid, source = %source_nid, target = %nid,
                        push = %push_cid, region = %region_box, "transfer scheduled"
                    );
                }
            }

            let kind = match chunk {
                Some(subrange) => CommandKind::Compute { subrange: *subrange },
                None => CommandKind::MasterAccess,
            };
            let cid = self.cdag.create(nid, Some(tid), kind);
            self.attach_to_anchors(cid, nid, &front_snapshot);
            for await_cid in await_cids {
                self.cdag.add_dependency(cid, await_cid, false);
            }
        }

        // Step 7: the task's writes invalidate all other replicas.
        let mut buffer_writers: BTreeMap<BufferId, BTreeMap<NodeId, GridRegion>> = BTreeMap::new();
        for (chunk_id, reqs) in &requirements {
            for (bid, req) in reqs {
                if req.write.is_empty() {
                    continue;
                }
                let entry =
                    buffer_writers.entry(*bid).or_default().entry(chunk_nodes[chunk_id]).or_default();
                *entry = GridRegion::merge(entry, &req.write);
            }
        }
        for (bid, writers) in &buffer_writers {
            ensure!(self.buffer_states.contains_key(bid), UnknownBufferSnafu { bid: *bid });
            let state = self.buffer_states.get_mut(bid).expect("presence checked above");
            for (nid, region) in writers {
                state.update_region(region, &BTreeSet::from([*nid]));
            }
        }

        debug!(%tid, chunks = chunks.len(), commands = self.cdag.command_count(), "task lowered");
        Ok(())
    }

    /// Greedy assignment, chunks in order.
    ///
    /// Only the first read buffer's first cover box is consulted: if a
    /// free node already holds that box, the smallest such node wins,
    /// otherwise the smallest free node. Chunks without reads take the
    /// smallest free node. The tie-breaks keep traces reproducible.
    fn assign_chunks_to_nodes(
        &self,
        tid: TaskId,
        chunks: &[Option<Subrange<3>>],
        requirements: &BTreeMap<ChunkId, BTreeMap<BufferId, Requirements>>,
        chunk_sources: &BTreeMap<ChunkId, BTreeMap<BufferId, SourceCover>>,
    ) -> Result<BTreeMap<ChunkId, NodeId>> {
        if let [None] = chunks {
            return Ok(BTreeMap::from([(ChunkId(0), NodeId::MASTER)]));
        }

        let mut free: BTreeSet<NodeId> = if self.num_nodes == 1 {
            BTreeSet::from([NodeId::MASTER])
        } else {
            (1..self.num_nodes as u64).map(NodeId).collect()
        };

        let mut assigned = BTreeMap::new();
        for (chunk_id, reqs) in requirements {
            ensure!(!free.is_empty(), NoFreeNodesSnafu { tid });

            let source_nodes = reqs
                .iter()
                .find(|(_, req)| !req.read.is_empty())
                .and_then(|(bid, _)| chunk_sources[chunk_id].get(bid))
                .and_then(|cover| cover.first())
                .map(|(_, nodes)| nodes);

            let smallest_free = *free.first().expect("free set checked non-empty");
            let nid = match source_nodes {
                Some(nodes) => free.intersection(nodes).next().copied().unwrap_or(smallest_free),
                None => smallest_free,
            };
            free.remove(&nid);
            assigned.insert(*chunk_id, nid);
        }
        Ok(assigned)
    }

    /// Order `cid` after every prerequisite-task command that was on its
    /// node's execution front when the current task started. The task
    /// graph's edges are the source of truth for what counts as a
    /// prerequisite.
    fn attach_to_anchors(
        &mut self,
        cid: CommandId,
        nid: NodeId,
        front_snapshot: &BTreeMap<NodeId, Vec<CommandId>>,
    ) {
        if let Some(anchors) = front_snapshot.get(&nid) {
            for anchor in anchors {
                self.cdag.add_dependency(cid, *anchor, false);
            }
        }
    }
}

fn merge_requirement(
    requirements: &mut BTreeMap<BufferId, Requirements>,
    bid: BufferId,
    mode: AccessMode,
    region: &GridRegion,
) {
    let entry = requirements.entry(bid).or_default();
    match mode {
        AccessMode::Read => entry.read = GridRegion::merge(&entry.read, region),
        AccessMode::Write => entry.write = GridRegion::merge(&entry.write, region),
    }
}
