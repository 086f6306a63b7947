//! External tool integration: executable discovery and subprocess execution.

pub mod resolver;
pub mod runner;

// Re-export key types for convenience
pub use resolver::{
    resolve_tool, resolve_tools, ResolveError, ResolvedTool, ResolvedTools, ToolKind, ToolSource,
};
pub use runner::{run_command, RunOutput, RunnerError};
