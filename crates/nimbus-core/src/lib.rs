//! Core types and error definitions for the Nimbus weather agent.
//!
//! This crate provides the foundational types shared across all Nimbus crates:
//! the error taxonomy, the `ToolCaller` seam between the agent layer and the
//! MCP client, and the typed weather records decoded from tool results.
//!
//! # Main types
//!
//! - [`WeatherError`] — Unified error enum for all Nimbus subsystems.
//! - [`WeatherResult`] — Convenience alias for `Result<T, WeatherError>`.
//! - [`ToolCaller`] — Trait abstracting "invoke a named remote tool".
//! - [`records`] — Immutable weather domain records.

/// Typed weather domain records decoded from tool results.
pub mod records;

use async_trait::async_trait;

/// Result alias used throughout the Nimbus crates.
pub type WeatherResult<T> = Result<T, WeatherError>;

/// Top-level error type for the Nimbus weather agent.
///
/// The variants form the retry taxonomy: [`is_transient`](WeatherError::is_transient)
/// decides which failures the invoker may retry. Classification happens at the
/// MCP client boundary; nothing below it returns a raw `std::io::Error`.
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    /// The server subprocess could not be started. Fatal for the client
    /// instance that tried to start it.
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// A read or write on the server's stdio failed, or the stream closed
    /// unexpectedly. Transient.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A frame on the wire (or a tool result payload) could not be parsed.
    /// Transient once; repeated consecutive failures indicate desync.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A well-formed error response from the server. Never retried.
    #[error("Server error {code}: {message}")]
    Protocol {
        /// JSON-RPC error code reported by the server.
        code: i64,
        /// Human-readable message reported by the server.
        message: String,
    },

    /// No response arrived within the configured call timeout. Transient.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Terminal wrapper produced when the retry budget is exhausted.
    /// Always carries the last transient cause.
    #[error("Operation failed after {attempts} attempt(s): {source}")]
    Operation {
        /// How many attempts were performed before giving up.
        attempts: u32,
        /// The final transient failure.
        #[source]
        source: Box<WeatherError>,
    },

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),
}

impl WeatherError {
    /// Whether this error is expected to resolve on retry.
    ///
    /// Protocol errors are definitive answers from the server and must never
    /// be retried; spawn failures are fatal for the client instance.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            WeatherError::Transport(_) | WeatherError::Timeout(_) | WeatherError::Decode(_)
        )
    }
}

/// Abstraction over "call a named remote tool with JSON arguments".
///
/// Implemented by the MCP client; consumed by the retry/cache wrapper so the
/// orchestration logic can be tested against in-memory fakes.
#[async_trait]
pub trait ToolCaller: Send + Sync {
    /// Invoke the named tool and return its decoded JSON result.
    async fn call_tool(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> WeatherResult<serde_json::Value>;
}
