//! Parley: a conversational client for MCP tool servers.
//!
//! A [`ConversationSession`](session::ConversationSession) connects to one or
//! more Model Context Protocol servers, binds the tools they expose to a chat
//! model, and keeps each thread's turns in a durable history file.
//!
//! # Quick Start
//!
//! ```no_run
//! use parley::prelude::*;
//!
//! # async fn example() -> parley::error::Result<()> {
//! let config = ParleyConfig::from_env()?;
//! let servers = config.default_servers();
//! let mut session = ConversationSession::from_config(&config, "thread-1", servers)?;
//! session.connect().await?;
//! let reply = session.invoke("Send 'hello' to +15550001111").await?;
//! println!("{reply}");
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod history;
pub mod mcp;
pub mod prelude;
pub mod provider;
pub mod session;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
