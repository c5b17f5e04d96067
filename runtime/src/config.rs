//! Runtime configuration.

use bon::bon;

/// Knobs for a [`Runtime`](crate::Runtime) instance.
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Log the full command graph after generation.
    pub trace_graph: bool,
}

#[bon]
impl RuntimeConfig {
    /// Create a runtime configuration with builder pattern.
    #[builder]
    pub fn builder(#[builder(default = false)] trace_graph: bool) -> Self {
        Self { trace_graph }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `CHORUS_TRACE_GRAPH` - Log the command graph after generation
    pub fn from_env() -> Self {
        let trace_graph = std::env::var("CHORUS_TRACE_GRAPH").is_ok();
        Self { trace_graph }
    }
}
