//! Error types for task lowering.

use snafu::Snafu;

use crate::ids::{BufferId, TaskId};

/// Result type for lowering operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur while lowering tasks into commands.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Equal splitting is only defined along the outermost dimension of
    /// 1-D and 2-D iteration spaces.
    #[snafu(display("equal split of a {dimensions}-dimensional iteration space is not supported"))]
    UnsupportedSplit { dimensions: u8 },

    /// More chunks than free nodes.
    #[snafu(display("no free node left while assigning chunks of task {tid}"))]
    NoFreeNodes { tid: TaskId },

    /// A task references a buffer that was never registered.
    #[snafu(display("buffer {bid} is not registered"))]
    UnknownBuffer { bid: BufferId },
}
