//! Configuration for the weather MCP server subprocess.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Configuration for spawning and talking to one MCP server.
///
/// Values are read once at startup (TOML or constructed directly) and passed
/// into [`crate::McpClient::connect`] as plain data.
#[derive(Debug, Clone, Deserialize)]
pub struct McpServerConfig {
    /// Executable to spawn.
    pub command: String,
    /// Arguments passed to the executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the subprocess.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Per-call response timeout in seconds (default: 30).
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// How long to wait for a graceful exit before killing (default: 5).
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_call_timeout() -> u64 {
    30
}
fn default_shutdown_grace() -> u64 {
    5
}

impl McpServerConfig {
    /// Per-call response timeout as a [`Duration`].
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Graceful shutdown window as a [`Duration`].
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
