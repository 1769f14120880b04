/// Centralized constants and helpers for MCP protocol
use serde_json::{json, Value};

/// MCP Protocol Version - single source of truth
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

/// JSON-RPC envelope builders to ensure consistency
pub struct JsonRpcEnvelopes;

impl JsonRpcEnvelopes {
    /// Create notifications/message carrying a leveled log payload
    pub fn log_message(level: &str, data: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": "notifications/message",
            "params": {
                "level": level,
                "logger": "notification-stream",
                "data": data
            }
        })
    }

    /// Create notifications/ping with timestamp
    pub fn ping() -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": "notifications/ping",
            "params": {
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        })
    }

    /// Create JSON-RPC error response
    pub fn error_response(code: i32, message: &str, id: Option<Value>) -> Value {
        json!({
            "jsonrpc": "2.0",
            "error": {
                "code": code,
                "message": message
            },
            "id": id
        })
    }

    /// Create custom notification with method and params
    pub fn notification(method: &str, params: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        })
    }
}
