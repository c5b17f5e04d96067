//! Shared helpers for runtime tests: recording launchers and
//! single-process cluster harnesses driven by interleaved ticks.

use std::cell::RefCell;
use std::rc::Rc;

use chorus_graph::{BufferId, GraphGenerator, NodeId, TaskGraph, TaskId};
use chorus_grid::Subrange;

use crate::error::Result;
use crate::executor::Executor;
use crate::job::{CompletionFlag, KernelLauncher};
use crate::scheduler;
use crate::storage::BufferStorage;
use crate::transport::local::LocalCluster;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchRecord {
    Compute { tid: TaskId, subrange: Subrange<3> },
    MasterAccess { tid: TaskId },
}

/// Launcher that records every launch. Immediate mode completes work
/// synchronously; manual mode hands out unset flags the test finishes
/// itself.
pub struct RecordingLauncher {
    log: Rc<RefCell<Vec<LaunchRecord>>>,
    manual_flags: Option<Rc<RefCell<Vec<CompletionFlag>>>>,
}

impl RecordingLauncher {
    pub fn immediate(log: Rc<RefCell<Vec<LaunchRecord>>>) -> Self {
        Self { log, manual_flags: None }
    }

    pub fn manual(
        log: Rc<RefCell<Vec<LaunchRecord>>>,
        flags: Rc<RefCell<Vec<CompletionFlag>>>,
    ) -> Self {
        Self { log, manual_flags: Some(flags) }
    }

    fn next_flag(&self) -> CompletionFlag {
        match &self.manual_flags {
            None => CompletionFlag::finished(),
            Some(flags) => {
                let flag = CompletionFlag::new();
                flags.borrow_mut().push(flag.clone());
                flag
            }
        }
    }
}

impl KernelLauncher for RecordingLauncher {
    fn launch_compute(&mut self, tid: TaskId, chunk: &Subrange<3>) -> Result<CompletionFlag> {
        self.log.borrow_mut().push(LaunchRecord::Compute { tid, subrange: *chunk });
        Ok(self.next_flag())
    }

    fn run_master_access(&mut self, tid: TaskId) -> Result<CompletionFlag> {
        self.log.borrow_mut().push(LaunchRecord::MasterAccess { tid });
        Ok(self.next_flag())
    }
}

/// One node of a single-process test cluster.
pub struct TestNode {
    pub executor: Executor,
    pub storage: Rc<RefCell<BufferStorage>>,
    pub log: Rc<RefCell<Vec<LaunchRecord>>>,
}

/// Build executors for every node of `cluster`, each with its own
/// storage holding the given buffers and an immediate recording
/// launcher.
pub fn build_nodes(
    cluster: &LocalCluster,
    num_nodes: usize,
    buffers: &[(BufferId, [usize; 3], usize)],
) -> Vec<TestNode> {
    (0..num_nodes as u64)
        .map(|n| {
            let transport = Rc::new(cluster.transport(NodeId(n)));
            let storage = Rc::new(RefCell::new(BufferStorage::new()));
            for (bid, range, elem_size) in buffers {
                storage.borrow_mut().register(*bid, *range, *elem_size);
            }
            let log = Rc::new(RefCell::new(Vec::new()));
            let launcher = Box::new(RecordingLauncher::immediate(Rc::clone(&log)));
            let executor = Executor::new(transport, Rc::clone(&storage), launcher);
            TestNode { executor, storage, log }
        })
        .collect()
}

/// Lower the task graph on the master and dispatch it into the cluster.
pub fn generate_and_dispatch(
    generator: &mut GraphGenerator,
    task_graph: &mut TaskGraph,
    cluster: &LocalCluster,
    nodes: &mut [TestNode],
) {
    generator.build_command_graph(task_graph).unwrap();
    let master_transport = cluster.transport(NodeId::MASTER);
    scheduler::dispatch(
        generator.command_graph_mut(),
        &master_transport,
        &mut nodes[0].executor,
    )
    .unwrap();
}

/// Interleave executor ticks until every node drains.
pub fn drive(nodes: &mut [TestNode]) {
    for _ in 0..10_000 {
        if nodes.iter().all(|n| n.executor.is_finished()) {
            return;
        }
        for node in nodes.iter_mut() {
            node.executor.tick().unwrap();
        }
    }
    panic!("cluster did not drain within the tick budget");
}

/// Fill a 1-D byte buffer region with `seed + index`.
pub fn fill_pattern(storage: &Rc<RefCell<BufferStorage>>, bid: BufferId, lo: usize, hi: usize, seed: u8) {
    let bytes: Vec<u8> = (lo..hi).map(|i| seed.wrapping_add(i as u8)).collect();
    storage.borrow_mut().set_data(bid, [lo, 0, 0], [hi - lo, 1, 1], &bytes).unwrap();
}

/// Read a 1-D byte buffer region back.
pub fn read_region(
    storage: &Rc<RefCell<BufferStorage>>,
    bid: BufferId,
    lo: usize,
    hi: usize,
) -> Vec<u8> {
    storage.borrow().get_data(bid, [lo, 0, 0], [hi - lo, 1, 1]).unwrap().into_bytes()
}

/// The expected contents of a pattern-filled region.
pub fn pattern(lo: usize, hi: usize, seed: u8) -> Vec<u8> {
    (lo..hi).map(|i| seed.wrapping_add(i as u8)).collect()
}
