use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rmcp::model::ClientInfo;
use rmcp::service::{ClientInitializeError, ServiceExt};
use rmcp::transport::TokioChildProcess;
use tokio::process::Command;

use super::{MCPRunningService, MCPTransport};

/// Child-process transport: the server speaks MCP on its stdin/stdout.
pub struct StdioTransport {
    program: String,
    argv: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl StdioTransport {
    pub fn new(program: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            program: program.into(),
            argv,
            working_dir: None,
        }
    }

    /// Run the child from `dir` so relative paths inside the server script resolve.
    pub fn in_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        if !dir.as_os_str().is_empty() {
            self.working_dir = Some(dir.to_path_buf());
        }
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.argv);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

#[async_trait]
impl MCPTransport for StdioTransport {
    async fn connect(
        &mut self,
        client_info: ClientInfo,
    ) -> Result<MCPRunningService, ClientInitializeError> {
        tracing::debug!(program = %self.program, argv = ?self.argv, "spawning MCP server");
        let child = TokioChildProcess::new(self.command()).map_err(|error| {
            ClientInitializeError::transport::<TokioChildProcess>(error, "spawn MCP server process")
        })?;
        client_info.into_dyn().serve(child).await
    }

    fn describe(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.argv.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
