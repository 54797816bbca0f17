//! Declarative descriptions of tool-providing MCP servers.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ParleyError;

/// Transport discriminator, used for logging and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum TransportKind {
    #[strum(serialize = "stdio", serialize = "local")]
    Stdio,
    #[strum(serialize = "http", serialize = "streamable_http")]
    Http,
}

/// Transport-specific connection parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ServerTransport {
    /// Local subprocess speaking MCP over stdin/stdout.
    #[serde(alias = "local")]
    Stdio {
        path: String,
        #[serde(default)]
        args: Vec<String>,
        /// Explicit launcher; inferred from the path extension when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },
    /// Remote endpoint speaking MCP over streamable HTTP.
    #[serde(alias = "streamable_http")]
    Http {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
    },
}

/// Immutable descriptor of one tool-providing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSpec {
    pub name: String,
    #[serde(flatten)]
    pub transport: ServerTransport,
}

impl ServerSpec {
    /// Local-process server launched from `path`.
    pub fn stdio(name: impl Into<String>, path: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            transport: ServerTransport::Stdio {
                path: path.into(),
                args,
                command: None,
            },
        }
    }

    /// Remote streamable-HTTP server.
    pub fn http(
        name: impl Into<String>,
        url: impl Into<String>,
        headers: BTreeMap<String, String>,
    ) -> Self {
        Self {
            name: name.into(),
            transport: ServerTransport::Http {
                url: url.into(),
                headers,
            },
        }
    }

    /// Override the launcher for a local-process server. No-op for HTTP.
    pub fn with_command(mut self, launcher: impl Into<String>) -> Self {
        if let ServerTransport::Stdio { command, .. } = &mut self.transport {
            *command = Some(launcher.into());
        }
        self
    }

    pub fn kind(&self) -> TransportKind {
        match self.transport {
            ServerTransport::Stdio { .. } => TransportKind::Stdio,
            ServerTransport::Http { .. } => TransportKind::Http,
        }
    }

    /// Reject specs whose transport-specific fields are absent or unusable.
    pub fn validate(&self) -> Result<(), ParleyError> {
        if self.name.trim().is_empty() {
            return Err(ParleyError::Configuration(
                "MCP server name must not be empty".into(),
            ));
        }

        match &self.transport {
            ServerTransport::Stdio { path, command, .. } => {
                if path.trim().is_empty() {
                    return Err(self.invalid("stdio transport requires a path"));
                }
                if command.as_deref().is_some_and(|c| c.trim().is_empty()) {
                    return Err(self.invalid("stdio command override must not be empty"));
                }
            }
            ServerTransport::Http { url, headers } => {
                let url = url.trim();
                if url.is_empty() {
                    return Err(self.invalid("http transport requires a url"));
                }
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(self.invalid(&format!("url '{url}' must be http(s)")));
                }
                for (key, value) in headers {
                    HeaderName::from_bytes(key.as_bytes())
                        .map_err(|_| self.invalid(&format!("invalid header name '{key}'")))?;
                    HeaderValue::from_str(value)
                        .map_err(|_| self.invalid(&format!("invalid value for header '{key}'")))?;
                }
            }
        }
        Ok(())
    }

    /// Program and argv used to launch a local-process server.
    ///
    /// Python and Node scripts get their interpreter; anything else is
    /// executed directly.
    pub fn launch_command(&self) -> Option<(String, Vec<String>)> {
        let ServerTransport::Stdio {
            path,
            args,
            command,
        } = &self.transport
        else {
            return None;
        };

        let launcher = command.clone().or_else(|| {
            let extension = Path::new(path).extension()?.to_str()?;
            match extension {
                "py" => Some("python".to_string()),
                "js" | "mjs" | "cjs" => Some("node".to_string()),
                _ => None,
            }
        });

        Some(match launcher {
            Some(program) => {
                let mut argv = Vec::with_capacity(args.len() + 1);
                argv.push(path.clone());
                argv.extend(args.iter().cloned());
                (program, argv)
            }
            None => (path.clone(), args.clone()),
        })
    }

    fn invalid(&self, reason: &str) -> ParleyError {
        ParleyError::Configuration(format!("MCP server '{}': {reason}", self.name))
    }
}

/// Ordered, validated set of server specs used by one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRegistry {
    servers: Vec<ServerSpec>,
}

impl ServerRegistry {
    /// Validate every spec and reject duplicate names.
    pub fn new(servers: Vec<ServerSpec>) -> Result<Self, ParleyError> {
        validate_all(&servers)?;
        Ok(Self { servers })
    }

    /// Parse a registry from TOML (`[[servers]]` tables).
    pub fn from_toml_str(raw: &str) -> Result<Self, ParleyError> {
        let parsed: ServerRegistry = toml::from_str(raw)
            .map_err(|e| ParleyError::Configuration(format!("invalid server registry: {e}")))?;
        Self::new(parsed.servers)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ParleyError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ParleyError::Configuration(format!(
                "cannot read server registry {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn specs(&self) -> &[ServerSpec] {
        &self.servers
    }

    pub fn into_specs(self) -> Vec<ServerSpec> {
        self.servers
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Validate a whole spec sequence before anything is opened.
pub fn validate_all(servers: &[ServerSpec]) -> Result<(), ParleyError> {
    let mut seen = HashSet::with_capacity(servers.len());
    for spec in servers {
        spec.validate()?;
        if !seen.insert(spec.name.trim()) {
            return Err(ParleyError::Configuration(format!(
                "Duplicate MCP server name '{}'",
                spec.name.trim()
            )));
        }
    }
    Ok(())
}
