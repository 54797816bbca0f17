//! Agent capability, response shapes, and response extraction.

pub mod agent;
pub mod extract;
pub mod response;

pub use agent::{AgentCapability, ToolLoopAgent, MAX_TOOL_ITERATIONS};
pub use extract::{extract_agent_data, AgentRunSummary, DeliveryReceipt, TokenCounts};
pub use response::{AgentMessage, AgentRequest, AgentResponse, ResponseMetadata};
