//! Filter descriptors and their external requirements.

use super::parser::parse_fields;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors from parsing a filter descriptor file.
#[derive(Debug, Clone, Error)]
pub enum DescriptorError {
    /// The file is not valid key/value descriptor syntax.
    #[error("descriptor parse error: {0}")]
    Parse(String),

    /// The descriptor has no id (empty file stem).
    #[error("descriptor has no id")]
    MissingId,

    /// The descriptor declares no input MIME types.
    #[error("descriptor '{id}' declares no input MIME types")]
    MissingInputs {
        /// The offending filter id.
        id: String,
    },

    /// The descriptor declares no output MIME type.
    #[error("descriptor '{id}' declares no output MIME type")]
    MissingOutput {
        /// The offending filter id.
        id: String,
    },
}

/// An external requirement a filter needs before it can run.
///
/// Parsed from the descriptor's `Require` expressions:
/// `exec:/name`, `config:/name`, `file:/path`, `serv:/host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// An executable must exist on PATH.
    Executable(String),
    /// A configuration file must exist in the standard config locations.
    ConfigFile(String),
    /// An arbitrary file or directory must exist.
    File(PathBuf),
    /// A TCP service must be reachable.
    TcpService {
        /// Host name or address.
        host: String,
        /// TCP port.
        port: u16,
    },
}

impl Requirement {
    /// Parse a requirement expression. Returns `None` for unparsable
    /// expressions; callers fail closed on those.
    pub fn parse(expr: &str) -> Option<Self> {
        let expr = expr.trim();
        if let Some(name) = expr.strip_prefix("exec:/") {
            if name.is_empty() {
                return None;
            }
            return Some(Self::Executable(name.to_string()));
        }
        if let Some(name) = expr.strip_prefix("config:/") {
            if name.is_empty() {
                return None;
            }
            return Some(Self::ConfigFile(name.to_string()));
        }
        if let Some(path) = expr.strip_prefix("file:") {
            if path.is_empty() {
                return None;
            }
            return Some(Self::File(PathBuf::from(path)));
        }
        if let Some(addr) = expr.strip_prefix("serv:/") {
            let (host, port) = addr.rsplit_once(':')?;
            let port: u16 = port.parse().ok()?;
            if host.is_empty() {
                return None;
            }
            return Some(Self::TcpService {
                host: host.to_string(),
                port,
            });
        }
        None
    }

    /// Check whether this requirement is currently satisfied.
    ///
    /// `connect_timeout` bounds the TCP-service probe; the other kinds are
    /// local filesystem/PATH lookups.
    pub fn satisfied(&self, connect_timeout: Duration) -> bool {
        match self {
            Self::Executable(name) => which::which(name).is_ok(),
            Self::ConfigFile(name) => config_locations()
                .iter()
                .any(|dir| dir.join(name).exists()),
            Self::File(path) => path.exists(),
            Self::TcpService { host, port } => tcp_reachable(host, *port, connect_timeout),
        }
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Executable(name) => write!(f, "exec:/{name}"),
            Self::ConfigFile(name) => write!(f, "config:/{name}"),
            Self::File(path) => write!(f, "file:{}", path.display()),
            Self::TcpService { host, port } => write!(f, "serv:/{host}:{port}"),
        }
    }
}

/// Standard configuration-file locations, highest priority first.
fn config_locations() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        dirs.push(dir);
    }
    dirs.push(PathBuf::from("/etc"));
    dirs
}

/// Bounded TCP reachability probe. Never blocks past the timeout per
/// resolved address.
fn tcp_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(err) => {
            tracing::debug!(host, port, %err, "service address did not resolve");
            return false;
        }
    };
    for addr in addrs {
        if TcpStream::connect_timeout(&addr, timeout).is_ok() {
            return true;
        }
    }
    false
}

/// One named conversion filter, parsed from a descriptor file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDescriptor {
    /// Unique filter id (the descriptor file stem).
    pub id: String,
    /// Display name (`Name` field).
    pub name: String,
    /// Human-readable description (`Comment` field, falling back to `Name`).
    pub description: String,
    /// Accepted input MIME types, in declaration order.
    pub inputs: Vec<String>,
    /// The single output MIME type.
    pub output: String,
    /// External requirement expressions (`Require` field), unevaluated.
    pub requirements: Vec<String>,
    /// Command-line template, if the descriptor declares one.
    pub command: Option<String>,
}

impl FilterDescriptor {
    /// Parse a descriptor from its id (file stem) and file contents.
    pub fn parse(id: &str, text: &str) -> Result<Self, DescriptorError> {
        if id.is_empty() {
            return Err(DescriptorError::MissingId);
        }

        let mut name = String::new();
        let mut comment = String::new();
        let mut inputs = Vec::new();
        let mut output = String::new();
        let mut requirements = Vec::new();
        let mut command = None;

        for (key, value) in parse_fields(text)? {
            match key.as_str() {
                "Name" => name = value,
                "Comment" => comment = value,
                "MimeTypeIn" => {
                    inputs.extend(
                        value
                            .split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from),
                    );
                }
                "MimeTypeOut" => output = value,
                "Require" => {
                    requirements.extend(
                        value
                            .split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(String::from),
                    );
                }
                "Command" => command = Some(value),
                other => {
                    tracing::debug!(id, key = other, "ignoring unknown descriptor field");
                }
            }
        }

        if inputs.is_empty() {
            return Err(DescriptorError::MissingInputs { id: id.to_string() });
        }
        if output.is_empty() {
            return Err(DescriptorError::MissingOutput { id: id.to_string() });
        }

        let description = if comment.is_empty() {
            name.clone()
        } else {
            comment
        };

        Ok(Self {
            id: id.to_string(),
            name,
            description,
            inputs,
            output,
            requirements,
            command,
        })
    }

    /// Construct a descriptor in memory, for embedders and tests.
    pub fn new(
        id: impl Into<String>,
        inputs: impl IntoIterator<Item = impl Into<String>>,
        output: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            description: String::new(),
            id,
            inputs: inputs.into_iter().map(Into::into).collect(),
            output: output.into(),
            requirements: Vec::new(),
            command: None,
        }
    }

    /// Whether this filter accepts the given input MIME type.
    pub fn accepts(&self, mime: &str) -> bool {
        self.inputs.iter().any(|m| m == mime)
    }

    /// Parse a descriptor file from disk, taking the id from the file stem.
    pub fn from_file(path: &Path) -> Result<Self, DescriptorError> {
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DescriptorError::Parse(e.to_string()))?;
        Self::parse(&id, &text)
    }
}
