//! The task-graph contract.
//!
//! Tasks are produced by the user-facing queue, which is an external
//! collaborator; the generator only needs the shapes defined here. A
//! minimal [`TaskGraph`] container is included so the lowering loop has
//! something to drain: tasks become *satisfied* once all their
//! predecessors have been processed, and are handed out in submission
//! order.

use std::collections::BTreeMap;

use chorus_grid::Subrange;

use crate::ids::{BufferId, TaskId};

/// How a task accesses a buffer region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
}

/// Maps a chunk's iteration subrange to the buffer region the chunk
/// accesses.
///
/// One variant per buffer dimensionality; the mapper receives the
/// chunk's subrange promoted to 3-D plus the kernel dimensionality, and
/// is dispatched exactly once per (chunk, accessor) pair.
pub enum RangeMapper {
    One {
        mode: AccessMode,
        map: Box<dyn Fn(&Subrange<3>, u8) -> Subrange<1>>,
    },
    Two {
        mode: AccessMode,
        map: Box<dyn Fn(&Subrange<3>, u8) -> Subrange<2>>,
    },
    Three {
        mode: AccessMode,
        map: Box<dyn Fn(&Subrange<3>, u8) -> Subrange<3>>,
    },
}

impl RangeMapper {
    pub fn mode(&self) -> AccessMode {
        match self {
            Self::One { mode, .. } | Self::Two { mode, .. } | Self::Three { mode, .. } => *mode,
        }
    }

    pub fn buffer_dimensions(&self) -> u8 {
        match self {
            Self::One { .. } => 1,
            Self::Two { .. } => 2,
            Self::Three { .. } => 3,
        }
    }

    /// Apply the mapper to a chunk, promoting the result to 3-D.
    pub fn apply(&self, chunk: &Subrange<3>, kernel_dimensions: u8) -> Subrange<3> {
        match self {
            Self::One { map, .. } => map(chunk, kernel_dimensions).promote(),
            Self::Two { map, .. } => map(chunk, kernel_dimensions).promote(),
            Self::Three { map, .. } => map(chunk, kernel_dimensions),
        }
    }

    /// Chunk indices map to the same buffer indices.
    pub fn one_to_one(mode: AccessMode) -> Self {
        Self::Three { mode, map: Box::new(|chunk, _| *chunk) }
    }

    /// Every chunk accesses the same fixed buffer subrange.
    pub fn fixed(mode: AccessMode, subrange: Subrange<3>) -> Self {
        Self::Three { mode, map: Box::new(move |_, _| subrange) }
    }
}

impl std::fmt::Debug for RangeMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeMapper")
            .field("mode", &self.mode())
            .field("buffer_dimensions", &self.buffer_dimensions())
            .finish()
    }
}

/// A plain buffer access declared by a master-access task.
///
/// No global size is given; region conversion treats the extent as
/// unbounded and clamps nothing.
#[derive(Debug, Clone, Copy)]
pub struct MasterBufferAccess {
    pub bid: BufferId,
    pub mode: AccessMode,
    pub offset: [usize; 3],
    pub range: [usize; 3],
}

impl MasterBufferAccess {
    pub fn subrange(&self) -> Subrange<3> {
        Subrange::new(self.offset, self.range, [usize::MAX; 3])
    }
}

/// A user-submitted unit of work.
#[derive(Debug)]
pub enum Task {
    /// A data-parallel kernel over a `dimensions`-dimensional iteration
    /// space, with range mappers describing its buffer accesses.
    Compute {
        dimensions: u8,
        global_size: [usize; 3],
        range_mappers: BTreeMap<BufferId, Vec<RangeMapper>>,
    },
    /// A closure that runs on the master node and touches buffers
    /// directly.
    MasterAccess { accesses: Vec<MasterBufferAccess> },
}

impl Task {
    /// A compute task over the given iteration space. `global_size` is
    /// already promoted to 3-D (trailing dimensions 1).
    pub fn compute(dimensions: u8, global_size: [usize; 3]) -> Self {
        Self::Compute { dimensions, global_size, range_mappers: BTreeMap::new() }
    }

    /// Attach a range mapper for `bid`. A task may carry several
    /// accessors for the same buffer.
    pub fn with_mapper(mut self, bid: BufferId, mapper: RangeMapper) -> Self {
        match &mut self {
            Self::Compute { range_mappers, .. } => {
                range_mappers.entry(bid).or_default().push(mapper);
            }
            Self::MasterAccess { .. } => panic!("range mappers only apply to compute tasks"),
        }
        self
    }

    pub fn master_access(accesses: Vec<MasterBufferAccess>) -> Self {
        Self::MasterAccess { accesses }
    }
}

struct TaskNode {
    task: Task,
    dependencies: Vec<TaskId>,
    processed: bool,
}

/// Submission-ordered task container implementing the producer contract.
#[derive(Default)]
pub struct TaskGraph {
    tasks: Vec<TaskNode>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submit a task depending on earlier tasks.
    pub fn add_task(&mut self, task: Task, dependencies: &[TaskId]) -> TaskId {
        for dep in dependencies {
            assert!(
                (dep.0 as usize) < self.tasks.len(),
                "task dependency {dep} submitted out of order"
            );
        }
        let tid = TaskId(self.tasks.len() as u64);
        self.tasks.push(TaskNode { task, dependencies: dependencies.to_vec(), processed: false });
        tid
    }

    /// The first unprocessed task whose predecessors are all processed.
    pub fn get_satisfied_task(&self) -> Option<TaskId> {
        self.tasks.iter().enumerate().find_map(|(i, node)| {
            let satisfied = !node.processed
                && node.dependencies.iter().all(|dep| self.tasks[dep.0 as usize].processed);
            satisfied.then(|| TaskId(i as u64))
        })
    }

    pub fn get_task(&self, tid: TaskId) -> &Task {
        &self.node(tid).task
    }

    pub fn dependencies_of(&self, tid: TaskId) -> &[TaskId] {
        &self.node(tid).dependencies
    }

    pub fn mark_task_as_processed(&mut self, tid: TaskId) {
        let idx = tid.0 as usize;
        assert!(idx < self.tasks.len(), "unknown task {tid}");
        self.tasks[idx].processed = true;
    }

    pub fn is_processed(&self, tid: TaskId) -> bool {
        self.node(tid).processed
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    fn node(&self, tid: TaskId) -> &TaskNode {
        self.tasks.get(tid.0 as usize).unwrap_or_else(|| panic!("unknown task {tid}"))
    }
}
