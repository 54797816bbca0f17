//! Command-line surface: argument parsing and the interactive loop.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ParleyError;
use crate::session::ConversationSession;

const SEPARATOR_WIDTH: usize = 50;

/// Chat with an agent wired to MCP tool servers.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Conversational MCP client")]
pub struct Cli {
    /// Conversation to resume (a new UUID when omitted)
    #[arg(long)]
    pub thread_id: Option<String>,

    /// TOML file listing MCP servers (defaults to the WhatsApp server)
    #[arg(long)]
    pub servers: Option<PathBuf>,

    /// History file (overrides PARLEY_HISTORY_FILE)
    #[arg(long)]
    pub history_file: Option<PathBuf>,

    /// Clear the thread's history before starting
    #[arg(long)]
    pub reset: bool,

    /// Log a run summary after every turn
    #[arg(long)]
    pub debug: bool,
}

/// What one line of user input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Skip,
    Exit,
    Reset,
    Message(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Skip;
        }
        if trimmed.eq_ignore_ascii_case("exit") || trimmed.eq_ignore_ascii_case("quit") {
            return Self::Exit;
        }
        if trimmed == "/reset" {
            return Self::Reset;
        }
        Self::Message(trimmed.to_string())
    }
}

/// Read lines until `exit`/`quit` or end of input, answering each message.
///
/// The caller owns the session and is responsible for closing it.
pub async fn run_repl<R, W>(
    session: &mut ConversationSession,
    input: R,
    mut output: W,
) -> Result<(), ParleyError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    loop {
        output.write_all(b"You: ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Skip => continue,
            ReplCommand::Exit => break,
            ReplCommand::Reset => {
                session.reset()?;
                output.write_all(b"History cleared.\n").await?;
            }
            ReplCommand::Message(text) => {
                let reply = session.invoke(&text).await?;
                let rendered = format!(
                    "\nAssistant:\n{reply}\n{}\n",
                    "-".repeat(SEPARATOR_WIDTH)
                );
                output.write_all(rendered.as_bytes()).await?;
            }
        }
    }
    output.flush().await?;
    Ok(())
}
