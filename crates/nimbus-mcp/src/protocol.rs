//! JSON-RPC 2.0 line codec for the MCP wire protocol.
//!
//! Pure functions and plain data only; all blocking I/O lives in
//! [`crate::transport`]. One frame is one JSON object, newline-terminated.

use nimbus_core::{WeatherError, WeatherResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC 2.0 request as sent on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    /// Always "2.0".
    pub jsonrpc: &'static str,
    /// Correlation id, unique per client session.
    pub id: u64,
    /// Method name, e.g. "tools/call".
    pub method: String,
    /// Structured parameters, omitted when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    /// Build a request envelope.
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    /// Correlation id; `None` when the server could not attribute the reply.
    pub id: Option<u64>,
    /// Success payload, mutually exclusive with `error` in practice.
    pub result: Option<Value>,
    /// Error payload for protocol-level failures.
    pub error: Option<RpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    /// Numeric error code (e.g. -32601 method not found).
    pub code: i64,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    #[serde(default)]
    pub data: Option<Value>,
}

/// A decoded incoming frame, classified by shape.
#[derive(Debug, Clone)]
pub enum RpcMessage {
    /// id + method: the server is asking us something.
    Request {
        /// Correlation id of the server-initiated request.
        id: u64,
        /// Method name.
        method: String,
        /// Structured parameters, if any.
        params: Option<Value>,
    },
    /// id + result/error: a reply to one of our requests.
    Response(RpcResponse),
    /// method only: unsolicited, no reply expected.
    Notification {
        /// Method name.
        method: String,
        /// Structured parameters, if any.
        params: Option<Value>,
    },
}

/// Tool definition from the `tools/list` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool name, e.g. "get_current_weather".
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// JSON Schema of the tool's arguments.
    #[serde(default = "default_input_schema", rename = "inputSchema")]
    pub input_schema: Value,
}

fn default_input_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// MCP server info from the `initialize` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version string.
    #[serde(default)]
    pub version: String,
}

/// MCP `initialize` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    /// Protocol revision the server speaks.
    #[serde(default, rename = "protocolVersion")]
    pub protocol_version: String,
    /// Capability advertisement; shape is server-defined.
    #[serde(default)]
    pub capabilities: Value,
    /// Identity of the server, when advertised.
    #[serde(default, rename = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Encode one request as a single unframed line (no trailing newline).
///
/// Deterministic for identical inputs; the transport appends the delimiter.
pub fn encode_request(id: u64, method: &str, params: Option<Value>) -> WeatherResult<String> {
    serde_json::to_string(&RpcRequest::new(id, method, params))
        .map_err(|e| WeatherError::Decode(format!("failed to encode request '{method}': {e}")))
}

/// Encode one notification (no id, no reply expected) as a single line.
pub fn encode_notification(method: &str, params: Option<Value>) -> WeatherResult<String> {
    let msg = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params.unwrap_or_else(|| serde_json::json!({})),
    });
    serde_json::to_string(&msg)
        .map_err(|e| WeatherError::Decode(format!("failed to encode notification '{method}': {e}")))
}

/// Classify and decode one incoming frame.
///
/// Shape rules: id + method is a request, id + result/error is a response,
/// method alone is a notification. Anything else is a [`WeatherError::Decode`],
/// never a silent drop.
pub fn decode_message(frame: &str) -> WeatherResult<RpcMessage> {
    let value: Value = serde_json::from_str(frame)
        .map_err(|e| WeatherError::Decode(format!("malformed frame: {e}")))?;

    let obj = value
        .as_object()
        .ok_or_else(|| WeatherError::Decode("frame is not a JSON object".into()))?;

    let method = obj.get("method").and_then(Value::as_str);
    let has_id = obj.contains_key("id");

    if let Some(method) = method {
        let params = obj.get("params").cloned();
        if has_id {
            let id = obj
                .get("id")
                .and_then(Value::as_u64)
                .ok_or_else(|| WeatherError::Decode("request id is not a u64".into()))?;
            return Ok(RpcMessage::Request {
                id,
                method: method.to_string(),
                params,
            });
        }
        return Ok(RpcMessage::Notification {
            method: method.to_string(),
            params,
        });
    }

    if has_id && (obj.contains_key("result") || obj.contains_key("error")) {
        let resp: RpcResponse = serde_json::from_value(value)
            .map_err(|e| WeatherError::Decode(format!("malformed response: {e}")))?;
        return Ok(RpcMessage::Response(resp));
    }

    Err(WeatherError::Decode(
        "frame is neither request, response nor notification".into(),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn encode_request_shape() {
        let line = encode_request(7, "tools/call", Some(serde_json::json!({"name": "x"}))).unwrap();
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["jsonrpc"], "2.0");
        assert_eq!(parsed["id"], 7);
        assert_eq!(parsed["method"], "tools/call");
        assert_eq!(parsed["params"]["name"], "x");
        assert!(!line.contains('\n'));
    }

    #[test]
    fn encode_request_omits_absent_params() {
        let line = encode_request(2, "tools/list", None).unwrap();
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert!(parsed.get("params").is_none());
    }

    #[test]
    fn encode_is_deterministic() {
        let params = serde_json::json!({"location": "London", "units": "metric"});
        let a = encode_request(1, "tools/call", Some(params.clone())).unwrap();
        let b = encode_request(1, "tools/call", Some(params)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn round_trip_preserves_id_method_params() {
        let params = serde_json::json!({"location": "Tokyo", "days": 3});
        let line = encode_request(42, "tools/call", Some(params.clone())).unwrap();
        match decode_message(&line).unwrap() {
            RpcMessage::Request {
                id,
                method,
                params: decoded,
            } => {
                assert_eq!(id, 42);
                assert_eq!(method, "tools/call");
                assert_eq!(decoded, Some(params));
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn decode_response_with_result() {
        let msg = decode_message(r#"{"jsonrpc":"2.0","id":1,"result":{"temperature":12.5}}"#)
            .unwrap();
        match msg {
            RpcMessage::Response(resp) => {
                assert_eq!(resp.id, Some(1));
                assert!(resp.result.is_some());
                assert!(resp.error.is_none());
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn decode_response_with_error() {
        let msg = decode_message(
            r#"{"jsonrpc":"2.0","id":9,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        match msg {
            RpcMessage::Response(resp) => {
                let err = resp.error.unwrap();
                assert_eq!(err.code, -32601);
                assert_eq!(err.message, "Method not found");
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn decode_response_with_null_id() {
        // Servers answer unparseable input with id:null; still a response.
        let msg =
            decode_message(r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#)
                .unwrap();
        match msg {
            RpcMessage::Response(resp) => assert!(resp.id.is_none()),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn decode_notification() {
        let msg = decode_message(r#"{"jsonrpc":"2.0","method":"notifications/progress","params":{"pct":50}}"#)
            .unwrap();
        match msg {
            RpcMessage::Notification { method, params } => {
                assert_eq!(method, "notifications/progress");
                assert_eq!(params.unwrap()["pct"], 50);
            }
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn malformed_frames_are_decode_errors() {
        let cases = [
            "",
            "not json at all",
            "{\"jsonrpc\":\"2.0\"",          // truncated
            "[1,2,3]",                        // not an object
            "42",                             // scalar
            r#"{"jsonrpc":"2.0"}"#,           // no method, no id
            r#"{"jsonrpc":"2.0","id":5}"#,    // id but no result/error/method
            r#"{"id":"abc","method":"m"}"#,   // non-numeric request id
        ];
        for frame in cases {
            match decode_message(frame) {
                Err(nimbus_core::WeatherError::Decode(_)) => {}
                other => panic!("expected decode error for {frame:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn tool_def_parse_with_defaults() {
        let tool: ToolDef = serde_json::from_str(r#"{"name":"get_alerts"}"#).unwrap();
        assert_eq!(tool.name, "get_alerts");
        assert!(tool.description.is_empty());
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn initialize_result_parse() {
        let result: InitializeResult = serde_json::from_str(
            r#"{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"weather","version":"1.0"}}"#,
        )
        .unwrap();
        assert_eq!(result.protocol_version, "2024-11-05");
        assert_eq!(result.server_info.unwrap().name, "weather");
    }
}
