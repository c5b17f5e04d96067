//! Error types for distributed execution.

use snafu::Snafu;

use chorus_graph::BufferId;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur during distributed execution.
///
/// Transport faults are fatal: the distributed state cannot be locally
/// recovered, so callers log and terminate.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// The messaging layer reported a failure.
    #[snafu(display("transport failure: {reason}"))]
    Transport { reason: String },

    /// A command or transfer referenced an unregistered buffer.
    #[snafu(display("buffer {bid} is not registered"))]
    UnknownBuffer { bid: BufferId },

    /// A buffer access fell outside the buffer's extent.
    #[snafu(display("box {offset:?}+{range:?} is out of bounds for buffer {bid}"))]
    StorageBounds {
        bid: BufferId,
        offset: [usize; 3],
        range: [usize; 3],
    },

    /// Linearised data did not match the box it was written to.
    #[snafu(display("linearized data size mismatch: expected {expected}, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    /// Only one queue can be attached per process.
    #[snafu(display("a queue is already attached to this runtime"))]
    QueueAlreadyAttached,

    /// Work was submitted before a queue was attached.
    #[snafu(display("no queue attached to this runtime"))]
    QueueNotAttached,

    /// A wire package carried an unknown or out-of-place command kind.
    #[snafu(display("unexpected command kind {kind}"))]
    UnexpectedCommand { kind: u32 },

    /// Lowering the task graph failed.
    #[snafu(display("command-graph generation failed: {source}"))]
    Graph { source: chorus_graph::Error },

    /// The kernel launcher rejected a chunk.
    #[snafu(display("kernel launch failed: {reason}"))]
    Launch { reason: String },
}
