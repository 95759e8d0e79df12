//! MCP client: composes the stdio transport and the codec into a typed call
//! surface (`initialize` / `list_tools` / `call_tool` / `shutdown`).
//!
//! A single background read loop is the only consumer of the server's stdout.
//! Responses are routed to waiting callers through a pending map of oneshot
//! senders keyed by correlation id, which is what allows concurrent
//! outstanding calls. A caller that times out removes its own pending entry,
//! so a late response finds no receiver and is discarded.

use crate::config::McpServerConfig;
use crate::protocol::{self, InitializeResult, RpcMessage, RpcResponse, ToolDef};
use crate::transport::StdioTransport;
use async_trait::async_trait;
use nimbus_core::{ToolCaller, WeatherError, WeatherResult};
use parking_lot::Mutex as SyncMutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

/// Client lifecycle. `call_tool` is only valid in `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    Uninitialized,
    Ready,
    ShuttingDown,
    Closed,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>>;

/// MCP client talking to one weather server subprocess.
pub struct McpClient {
    transport: Arc<StdioTransport>,
    pending: PendingMap,
    next_id: AtomicU64,
    state: SyncMutex<ClientState>,
    call_timeout: Duration,
    shutdown_grace: Duration,
    reader: tokio::task::JoinHandle<()>,
}

impl McpClient {
    /// Spawn the server subprocess and start the read loop.
    ///
    /// The client starts `Uninitialized`; call [`initialize`](Self::initialize)
    /// before any tool call.
    pub fn connect(config: &McpServerConfig) -> WeatherResult<Self> {
        let transport = Arc::new(StdioTransport::spawn(config)?);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let reader = tokio::spawn(read_loop(transport.clone(), pending.clone()));

        Ok(Self {
            transport,
            pending,
            next_id: AtomicU64::new(1),
            state: SyncMutex::new(ClientState::Uninitialized),
            call_timeout: config.call_timeout(),
            shutdown_grace: config.shutdown_grace(),
            reader,
        })
    }

    /// Perform the MCP `initialize` handshake and move to `Ready`.
    ///
    /// Fails the transition (state stays `Uninitialized`) if the server
    /// answers with an error or does not answer within the call timeout.
    pub async fn initialize(&self) -> WeatherResult<InitializeResult> {
        {
            let state = self.state.lock();
            if *state != ClientState::Uninitialized {
                return Err(WeatherError::Transport(format!(
                    "initialize is not valid in state {state:?}"
                )));
            }
        }

        let params = serde_json::json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "nimbus",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        let resp = self.request("initialize", Some(params)).await?;
        let result: InitializeResult = serde_json::from_value(
            resp.result
                .ok_or_else(|| WeatherError::Decode("empty initialize result".into()))?,
        )
        .map_err(|e| WeatherError::Decode(format!("malformed initialize result: {e}")))?;

        self.notify("notifications/initialized", None).await?;
        *self.state.lock() = ClientState::Ready;

        info!(
            protocol = %result.protocol_version,
            server = result.server_info.as_ref().map(|s| s.name.as_str()).unwrap_or("unknown"),
            "weather server initialized"
        );
        Ok(result)
    }

    /// List the tools the server advertises.
    pub async fn list_tools(&self) -> WeatherResult<Vec<ToolDef>> {
        self.ensure_ready()?;
        let resp = self.request("tools/list", None).await?;
        let result = resp
            .result
            .ok_or_else(|| WeatherError::Decode("empty tools/list result".into()))?;
        let tools: Vec<ToolDef> = serde_json::from_value(
            result
                .get("tools")
                .cloned()
                .unwrap_or_else(|| serde_json::json!([])),
        )
        .map_err(|e| WeatherError::Decode(format!("malformed tool list: {e}")))?;
        Ok(tools)
    }

    /// Call a named tool and return its JSON result.
    ///
    /// Protocol-level failures (a JSON-RPC error object, or an `"error"`
    /// field embedded in the result payload) surface as
    /// [`WeatherError::Protocol`] and are never retried here or above.
    pub async fn call_tool(&self, name: &str, args: Value) -> WeatherResult<Value> {
        self.ensure_ready()?;
        debug!(tool = name, "tool call started");

        let params = serde_json::json!({ "name": name, "arguments": args });
        let resp = self.request("tools/call", Some(params)).await?;
        let result = resp
            .result
            .ok_or_else(|| WeatherError::Decode("empty tools/call result".into()))?;

        let value = unwrap_tool_result(result)?;
        if let Some(message) = embedded_error(&value) {
            return Err(WeatherError::Protocol {
                code: -32000,
                message,
            });
        }
        Ok(value)
    }

    /// Shut the client down: close the server's stdin, wait for exit, kill
    /// after the grace period. Idempotent; a no-op once `Closed`.
    pub async fn shutdown(&self) -> WeatherResult<()> {
        {
            let mut state = self.state.lock();
            if *state == ClientState::Closed {
                return Ok(());
            }
            *state = ClientState::ShuttingDown;
        }

        let result = self.transport.terminate(self.shutdown_grace).await;
        self.reader.abort();
        self.pending.lock().await.clear();
        *self.state.lock() = ClientState::Closed;
        debug!("client closed");
        result
    }

    /// Recent stderr output from the server, for diagnostics.
    pub fn server_stderr(&self) -> Vec<String> {
        self.transport.stderr_tail()
    }

    fn ensure_ready(&self) -> WeatherResult<()> {
        let state = self.state.lock();
        if *state == ClientState::Ready {
            Ok(())
        } else {
            Err(WeatherError::Transport(format!(
                "client is not ready (state {state:?})"
            )))
        }
    }

    /// Send one request and wait for the correlated response or timeout.
    async fn request(&self, method: &str, params: Option<Value>) -> WeatherResult<RpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = protocol::encode_request(id, method, params)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.transport.send(&frame).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let resp = match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => {
                // Read loop dropped our sender: the server went away.
                let tail = self.transport.stderr_tail();
                let detail = tail
                    .last()
                    .map(|l| format!(" (last stderr: {l})"))
                    .unwrap_or_default();
                return Err(WeatherError::Transport(format!(
                    "server closed the connection while '{method}' was pending{detail}"
                )));
            }
            Err(_) => {
                // Give up waiting; the entry is removed so a late response
                // for this id is discarded by the read loop.
                self.pending.lock().await.remove(&id);
                return Err(WeatherError::Timeout(format!(
                    "no response to '{method}' within {:?}",
                    self.call_timeout
                )));
            }
        };

        if let Some(err) = resp.error {
            return Err(WeatherError::Protocol {
                code: err.code,
                message: err.message,
            });
        }
        Ok(resp)
    }

    /// Send one notification; no reply is expected or tracked.
    async fn notify(&self, method: &str, params: Option<Value>) -> WeatherResult<()> {
        let frame = protocol::encode_notification(method, params)?;
        self.transport.send(&frame).await
    }
}

#[async_trait]
impl ToolCaller for McpClient {
    async fn call_tool(&self, name: &str, args: Value) -> WeatherResult<Value> {
        McpClient::call_tool(self, name, args).await
    }
}

/// Single consumer of the server's stdout.
///
/// Routes responses by id, logs notifications, and discards responses whose
/// id is no longer pending (the caller timed out). One undecodable frame is
/// skipped as a resync attempt; two in a row mean the stream is desynced and
/// the loop stops, failing all pending calls.
async fn read_loop(transport: Arc<StdioTransport>, pending: PendingMap) {
    let mut decode_failures = 0u32;
    loop {
        match transport.recv().await {
            Ok(Some(frame)) => match protocol::decode_message(&frame) {
                Ok(RpcMessage::Response(resp)) => {
                    decode_failures = 0;
                    let Some(id) = resp.id else {
                        warn!("response without id, dropping");
                        continue;
                    };
                    let mut map = pending.lock().await;
                    match map.remove(&id) {
                        Some(tx) => {
                            let _ = tx.send(resp);
                        }
                        None => debug!(id, "discarding late or unmatched response"),
                    }
                }
                Ok(RpcMessage::Notification { method, .. }) => {
                    decode_failures = 0;
                    debug!(%method, "server notification");
                }
                Ok(RpcMessage::Request { id, method, .. }) => {
                    decode_failures = 0;
                    warn!(id, %method, "unexpected server-initiated request, ignoring");
                }
                Err(e) => {
                    decode_failures += 1;
                    if decode_failures > 1 {
                        error!(error = %e, "repeated undecodable frames, stream is desynced");
                        break;
                    }
                    warn!(error = %e, "skipping undecodable frame");
                }
            },
            Ok(None) => {
                debug!("server stdout closed");
                break;
            }
            Err(e) => {
                error!(error = %e, "read from server failed");
                break;
            }
        }
    }
    // Dropping the senders fails every waiting caller with a transport error.
    pending.lock().await.clear();
}

/// Narrow a `tools/call` result to the tool's own JSON payload.
///
/// Servers speaking full MCP wrap results in content blocks
/// (`{"content":[{"type":"text","text":"..."}],"isError":bool}`); simpler
/// line-protocol servers return the payload directly. Accept both.
fn unwrap_tool_result(result: Value) -> WeatherResult<Value> {
    let Some(content) = result.get("content").and_then(Value::as_array) else {
        return Ok(result);
    };

    let text: String = content
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n");

    if result.get("isError").and_then(Value::as_bool) == Some(true) {
        return Err(WeatherError::Protocol {
            code: -32000,
            message: text,
        });
    }

    // Tool payloads are JSON more often than not; fall back to plain text.
    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

/// Tool-level failures the server embeds in an otherwise successful result,
/// e.g. `{"error": "Unknown tool: x"}`.
fn embedded_error(value: &Value) -> Option<String> {
    value
        .get("error")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn unwrap_plain_payload_passes_through() {
        let raw = serde_json::json!({"temperature": 12.5});
        assert_eq!(unwrap_tool_result(raw.clone()).unwrap(), raw);
    }

    #[test]
    fn unwrap_content_blocks_parses_inner_json() {
        let raw = serde_json::json!({
            "content": [{"type": "text", "text": "{\"temperature\": 12.5}"}],
            "isError": false
        });
        let value = unwrap_tool_result(raw).unwrap();
        assert_eq!(value["temperature"], 12.5);
    }

    #[test]
    fn unwrap_content_blocks_keeps_non_json_text() {
        let raw = serde_json::json!({
            "content": [{"type": "text", "text": "just words"}]
        });
        assert_eq!(unwrap_tool_result(raw).unwrap(), Value::String("just words".into()));
    }

    #[test]
    fn unwrap_is_error_content_is_protocol_error() {
        let raw = serde_json::json!({
            "content": [{"type": "text", "text": "boom"}],
            "isError": true
        });
        match unwrap_tool_result(raw) {
            Err(WeatherError::Protocol { message, .. }) => assert_eq!(message, "boom"),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[test]
    fn embedded_error_detection() {
        let err = serde_json::json!({"error": "Unknown tool: get_snow"});
        assert_eq!(embedded_error(&err).unwrap(), "Unknown tool: get_snow");

        let ok = serde_json::json!({"temperature": 1.0});
        assert!(embedded_error(&ok).is_none());

        // A structured "error" object is not the string convention; leave it
        // to the record decoders.
        let nested = serde_json::json!({"error": {"code": 1}});
        assert!(embedded_error(&nested).is_none());
    }
}
