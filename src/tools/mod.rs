//! Tool handles: the invocable capabilities exposed to the agent.

pub mod arguments;
pub mod dynamic;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use dynamic::{DynamicTool, DynamicToolAdapter, DynamicToolProvider};
pub use tool::{AgentTool, Tool, ToolExecutionContext};
pub use types::AgentToolParameters;
