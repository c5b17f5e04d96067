//! The per-process runtime façade.
//!
//! A plain value, constructed once by the hosting process around an
//! initialised transport — re-constructible in tests without touching
//! the messaging layer. The master node owns the graph generator; every
//! node owns its buffer storage and executor.

use std::cell::RefCell;
use std::rc::Rc;

use snafu::{OptionExt, ResultExt, ensure};
use tracing::debug;

use chorus_graph::{BufferId, GraphGenerator, TaskGraph};

use crate::config::RuntimeConfig;
use crate::error::{
    GraphSnafu, QueueAlreadyAttachedSnafu, QueueNotAttachedSnafu, Result,
};
use crate::executor::Executor;
use crate::job::KernelLauncher;
use crate::scheduler;
use crate::storage::{BufferStorage, LinearizedData};
use crate::transport::Transport;

pub struct Runtime {
    transport: Rc<dyn Transport>,
    config: RuntimeConfig,
    storage: Rc<RefCell<BufferStorage>>,
    /// Master only: lowers tasks into commands.
    generator: Option<GraphGenerator>,
    /// Created when the queue attaches (the executor needs the
    /// launcher).
    executor: Option<Executor>,
    buffer_count: u64,
}

impl Runtime {
    pub fn new(transport: Rc<dyn Transport>, config: RuntimeConfig) -> Self {
        let generator = transport
            .node_id()
            .is_master()
            .then(|| GraphGenerator::new(transport.num_nodes()));
        debug!(node = %transport.node_id(), nodes = transport.num_nodes(), "runtime up");
        Self {
            transport,
            config,
            storage: Rc::new(RefCell::new(BufferStorage::new())),
            generator,
            executor: None,
            buffer_count: 0,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.transport.num_nodes()
    }

    pub fn is_master(&self) -> bool {
        self.transport.node_id().is_master()
    }

    /// Register a logical buffer on this node: storage everywhere,
    /// validity tracking on the master.
    pub fn register_buffer(
        &mut self,
        range: [usize; 3],
        elem_size: usize,
        host_initialized: bool,
    ) -> BufferId {
        let bid = BufferId(self.buffer_count);
        self.buffer_count += 1;
        self.storage.borrow_mut().register(bid, range, elem_size);
        if let Some(generator) = &mut self.generator {
            generator.register_buffer(bid, range, host_initialized);
        }
        bid
    }

    /// Deliberate no-op: whether freeing is safe cannot be decided
    /// locally while the task graph may still reference the buffer.
    pub fn unregister_buffer(&mut self, _bid: BufferId) {}

    /// Attach the user-facing queue's execution side. At most one queue
    /// per process.
    pub fn attach_queue(&mut self, launcher: Box<dyn KernelLauncher>) -> Result<()> {
        ensure!(self.executor.is_none(), QueueAlreadyAttachedSnafu);
        self.executor = Some(Executor::new(
            Rc::clone(&self.transport),
            Rc::clone(&self.storage),
            launcher,
        ));
        Ok(())
    }

    /// Lower and dispatch the task graph (master), then run this node's
    /// executor until its shutdown drains.
    pub fn do_work(&mut self, task_graph: &mut TaskGraph) -> Result<()> {
        let executor = self.executor.as_mut().context(QueueNotAttachedSnafu)?;
        if let Some(generator) = &mut self.generator {
            generator.build_command_graph(task_graph).context(GraphSnafu)?;
            if self.config.trace_graph {
                generator.command_graph().trace_graph();
            }
            scheduler::dispatch(generator.command_graph_mut(), self.transport.as_ref(), executor)?;
        }
        executor.run()
    }

    /// Borrowed row-major copy-out of a buffer box on this node.
    pub fn get_buffer_data(
        &self,
        bid: BufferId,
        offset: [usize; 3],
        range: [usize; 3],
    ) -> Result<LinearizedData> {
        self.storage.borrow().get_data(bid, offset, range)
    }

    /// Overwrite a buffer box on this node.
    pub fn set_buffer_data(
        &mut self,
        bid: BufferId,
        offset: [usize; 3],
        range: [usize; 3],
        bytes: &[u8],
    ) -> Result<()> {
        self.storage.borrow_mut().set_data(bid, offset, range, bytes)
    }

    /// Master only: the generator's view of buffer validity and the
    /// command graph. Exposed for tests and graph dumps.
    pub fn generator(&self) -> Option<&GraphGenerator> {
        self.generator.as_ref()
    }
}
