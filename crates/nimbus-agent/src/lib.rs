//! Weather agent layer: the retry/cache wrapper around tool calls and the
//! typed weather operations built on top of it.
//!
//! The agent never talks to the wire directly; everything goes through the
//! [`ToolCaller`](nimbus_core::ToolCaller) seam, so the orchestration logic
//! here is testable with in-memory fakes.

/// Time-bounded cache for decoded tool results.
pub mod cache;
/// Retry/cache wrapper around a `ToolCaller`.
pub mod invoker;
/// Typed weather operations and the combined analysis.
pub mod agent;

pub use agent::{AgentConfig, WeatherAgent, WeatherAnalysis};
pub use cache::{CacheConfig, ToolCache};
pub use invoker::{RetryPolicy, ToolInvoker};
