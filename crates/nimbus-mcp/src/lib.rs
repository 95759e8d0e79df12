//! MCP client layer: subprocess transport, JSON-RPC codec, and the typed
//! call surface (`initialize` / `call_tool` / `shutdown`) built on top.
//!
//! The layering mirrors the wire: [`transport`] owns the server subprocess
//! and moves whole line-delimited frames, [`protocol`] is the pure codec,
//! and [`client`] correlates responses to requests and enforces the client
//! state machine.

/// MCP client state machine and request/response correlation.
pub mod client;
/// Server subprocess configuration.
pub mod config;
/// Pure JSON-RPC 2.0 line codec.
pub mod protocol;
/// Subprocess stdio transport with line framing.
pub mod transport;

pub use client::McpClient;
pub use config::McpServerConfig;
pub use protocol::{RpcMessage, RpcResponse, ToolDef};
pub use transport::StdioTransport;
