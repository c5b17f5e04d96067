//! Identifier newtypes.
//!
//! All ids are monotonic and unique within a process. Node ids are
//! assigned by the transport; node 0 is the master/coordinator.

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident($inner:ty)) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub $inner);

        impl From<$inner> for $name {
            fn from(v: $inner) -> Self {
                Self(v)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type! {
    /// A logical buffer registered with the runtime.
    BufferId(u64)
}

id_type! {
    /// A user-submitted unit of work in the task graph.
    TaskId(u64)
}

id_type! {
    /// A command in the command graph.
    CommandId(u64)
}

id_type! {
    /// A cluster node. Node 0 is the master.
    NodeId(u64)
}

id_type! {
    /// A per-task chunk index.
    ChunkId(usize)
}

impl NodeId {
    pub const MASTER: NodeId = NodeId(0);

    pub fn is_master(&self) -> bool {
        self.0 == 0
    }
}
