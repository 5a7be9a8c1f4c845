//! Wire envelope for the WebSocket RPC protocol.
//!
//! Each text frame carries one JSON object. Requests are
//! `{"id", "method", "params"}`; responses echo the `id` and carry either
//! `result` or `error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use carapace_core::CarapaceError;

/// Method not found.
pub const ERR_METHOD_NOT_FOUND: i32 = -32601;
/// Internal error while handling the call.
pub const ERR_INTERNAL: i32 = -32603;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Maps a handler failure onto the wire error space: unknown methods get
    /// their own code, everything else is internal.
    pub fn from_error(id: Value, error: &CarapaceError) -> Self {
        match error {
            CarapaceError::MethodNotFound(method) => Self::err(
                id,
                ERR_METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            ),
            other => Self::err(id, ERR_INTERNAL, other.to_string()),
        }
    }
}
