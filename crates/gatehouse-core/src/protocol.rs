//! Wire envelope for the agent channel.
//!
//! The agent channel speaks JSON-RPC 2.0 request/response frames over a
//! message-oriented transport. The framing itself (WebSocket, TLS) lives in
//! the gateway crate; these are only the envelope types and error codes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope protocol version, echoed on every frame.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Malformed envelope.
pub const PARSE_ERROR: i32 = -32700;
/// Missing or invalid fields, forbidden characters, unknown required arg.
pub const INVALID_REQUEST: i32 = -32600;
/// Unknown method.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// The guardian denied the request.
pub const USER_DENIED: i32 = -32001;
/// The approval window elapsed.
pub const APPROVAL_TIMEOUT: i32 = -32002;
/// Policy denied the request.
pub const POLICY_DENIED: i32 = -32003;
/// Dispatch failed.
pub const EXECUTION_FAILED: i32 = -32004;
/// The connection is not authenticated.
pub const NOT_AUTHENTICATED: i32 = -32005;
/// A resource cap was exceeded.
pub const RATE_LIMIT_EXCEEDED: i32 = -32006;

/// An inbound request frame from the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Protocol version marker.
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Method name (`auth`, `tool_request`, `list_tools`,
    /// `get_pending_results`).
    #[serde(default)]
    pub method: Option<String>,
    /// Method parameters.
    #[serde(default)]
    pub params: Option<Value>,
    /// Request id, echoed in the response. Doubles as the tool request id.
    #[serde(default)]
    pub id: Option<Value>,
}

impl RequestFrame {
    /// Parse a raw text frame.
    ///
    /// # Errors
    ///
    /// Returns the raw `serde_json` error when the frame is not valid JSON;
    /// callers map this to [`PARSE_ERROR`].
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// The request id rendered as an opaque string, if present.
    ///
    /// Numeric and string ids are both accepted; anything else (objects,
    /// arrays, null) is treated as absent.
    #[must_use]
    pub fn id_string(&self) -> Option<String> {
        match &self.id {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Error body of a response frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Numeric error code (see the constants in this module).
    pub code: i32,
    /// Short human-readable message.
    pub message: String,
}

/// An outbound response frame to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Protocol version marker, always [`PROTOCOL_VERSION`].
    pub jsonrpc: String,
    /// Success payload. Mutually exclusive with `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error payload. Mutually exclusive with `result`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    /// The id of the frame being answered (`null` when unknowable, e.g.
    /// parse errors).
    pub id: Value,
}

impl ResponseFrame {
    /// Build a success response.
    #[must_use]
    pub fn result(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION.to_string(),
            result: Some(result),
            error: None,
            id: id.unwrap_or(Value::Null),
        }
    }

    /// Build an error response.
    #[must_use]
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION.to_string(),
            result: None,
            error: Some(ErrorObject {
                code,
                message: message.into(),
            }),
            id: id.unwrap_or(Value::Null),
        }
    }

    /// Serialize to a text frame.
    ///
    /// Serialization of these types cannot fail; a `String` is returned
    /// directly.
    #[must_use]
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            // Unreachable for this type; keep the channel alive regardless.
            format!(
                "{{\"jsonrpc\":\"{PROTOCOL_VERSION}\",\"error\":{{\"code\":{},\"message\":\"internal error\"}},\"id\":null}}",
                EXECUTION_FAILED
            )
        })
    }
}

/// Parameters of the `auth` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthParams {
    /// Shared agent bearer token.
    #[serde(default)]
    pub token: String,
}

/// Parameters of the `tool_request` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequestParams {
    /// Tool name.
    #[serde(default)]
    pub tool: Option<String>,
    /// Argument map.
    #[serde(default)]
    pub args: crate::model::ToolArgs,
}
