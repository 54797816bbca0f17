//! Error types for Parley.

use strum::Display;
use thiserror::Error;

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    Connection,
    Storage,
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    ToolExecution,
    Unknown,
}

/// One resource that failed to release during a group teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFailure {
    pub resource: String,
    pub message: String,
}

impl std::fmt::Display for ReleaseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.resource, self.message)
    }
}

/// Primary error type for all Parley operations.
#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Missing required environment variables: {}", keys.join(", "))]
    MissingEnvironment { keys: Vec<String> },

    #[error("Connection to MCP server '{server}' failed: {message}")]
    Connection { server: String, message: String },

    #[error("No MCP tools discovered across {servers} server(s)")]
    NoToolsDiscovered { servers: usize },

    #[error("Failed to release {} resource(s): {}", failures.len(), join_failures(failures))]
    Release { failures: Vec<ReleaseFailure> },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limited: retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool loop gave no final answer within {iterations} iterations")]
    ToolLoopExhausted { iterations: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

fn join_failures(failures: &[ReleaseFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ParleyError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a connection error for a named server.
    pub fn connection(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::MissingEnvironment { .. } => {
                ErrorCategory::Configuration
            }
            Self::Connection { .. } | Self::NoToolsDiscovered { .. } | Self::Release { .. } => {
                ErrorCategory::Connection
            }
            Self::Io(_) | Self::Serialization(_) => ErrorCategory::Storage,
            Self::Authentication(_) => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::ToolExecution { .. } | Self::ToolLoopExhausted { .. } => {
                ErrorCategory::ToolExecution
            }
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }

    /// Whether this error is a timeout, either ours or the HTTP client's.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Network(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ParleyError>;
