//! Register tool servers in an MCP client's JSON configuration

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::create_dir_0755;
use crate::error::{IoResultExt, MegatoolError, Result};

const SERVERS_KEY: &str = "mcpServers";

/// MCP clients whose configuration file we know how to edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Client {
    ClaudeDesktop,
    Cursor,
    Windsurf,
}

impl Client {
    pub const ALL: [Client; 3] = [Client::ClaudeDesktop, Client::Cursor, Client::Windsurf];

    pub fn id(&self) -> &'static str {
        match self {
            Client::ClaudeDesktop => "claude-desktop",
            Client::Cursor => "cursor",
            Client::Windsurf => "windsurf",
        }
    }

    pub fn parse(id: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.id() == id)
            .ok_or_else(|| {
                let supported: Vec<&str> = Self::ALL.iter().map(|c| c.id()).collect();
                MegatoolError::user_with_hint(
                    format!("Unsupported client '{}'", id),
                    format!("Supported clients: {}", supported.join(", ")),
                )
            })
    }

    /// Location of this client's configuration file on the current platform
    pub fn config_path(&self) -> Result<PathBuf> {
        let path = match self {
            Client::ClaudeDesktop => {
                dirs::config_dir().map(|d| d.join("Claude").join("claude_desktop_config.json"))
            }
            Client::Cursor => dirs::home_dir().map(|h| h.join(".cursor").join("mcp.json")),
            Client::Windsurf => dirs::home_dir().map(|h| {
                h.join(".codeium")
                    .join("windsurf")
                    .join("mcp_config.json")
            }),
        };
        path.ok_or_else(|| {
            MegatoolError::Unsupported(format!(
                "No configuration location for {} on this platform",
                self.id()
            ))
        })
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One entry under `mcpServers`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub command: String,
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(rename = "autoApprove", default)]
    pub auto_approve: Vec<String>,
}

impl ServerEntry {
    /// Entry that launches `server` through `command run`
    pub fn for_server(command: &str, server: &str, client: &str) -> Self {
        let mut args = vec!["run".to_string()];
        if !client.is_empty() {
            args.push("--client".to_string());
            args.push(client.to_string());
        }
        args.push(server.to_string());

        Self {
            command: command.to_string(),
            args,
            env: BTreeMap::new(),
            disabled: false,
            auto_approve: Vec::new(),
        }
    }
}

/// Write `entry` under `mcpServers[server]` in the config file at `path`
pub fn install_entry(path: &Path, server: &str, entry: &ServerEntry) -> Result<()> {
    let mut config = load(path)?;

    let servers = config
        .entry(SERVERS_KEY)
        .or_insert_with(|| Value::Object(Map::new()));
    let Value::Object(servers) = servers else {
        return Err(MegatoolError::user(format!(
            "'{}' in {} is not a JSON object",
            SERVERS_KEY,
            path.display()
        )));
    };

    let value = serde_json::to_value(entry).map_err(|source| MegatoolError::Config {
        path: path.to_path_buf(),
        source,
    })?;
    servers.insert(server.to_string(), value);

    save(path, &config)
}

fn load(path: &Path) -> Result<Map<String, Value>> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => {
            return Err(MegatoolError::io(
                format!("Failed to read config file {}", path.display()),
                e,
            ))
        }
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    let value: Value = serde_json::from_slice(&bytes).map_err(|source| MegatoolError::Config {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(MegatoolError::user(format!(
            "Expected a JSON object at the root of {}",
            path.display()
        ))),
    }
}

fn save(path: &Path, config: &Map<String, Value>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if let Err(e) = create_dir_0755(parent) {
            tracing::warn!("Failed to create {}: {}", parent.display(), e);
        }
    }
    let bytes = serde_json::to_vec_pretty(config).map_err(|source| MegatoolError::Config {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, bytes)
        .io_context(|| format!("Failed to write config file {}", path.display()))
}
