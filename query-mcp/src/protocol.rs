//! Wire types for the JSON-RPC style envelope exchanged on a connection.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "0.1.0";
pub const SERVER_NAME: &str = "query-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One request as received from the peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Closed set of error classes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidParams,
    MethodNotFound,
    /// Tool-level failure: unknown tool, unsupported query, timeout, cancellation.
    ToolFailure,
}

impl ErrorCode {
    pub fn as_i64(self) -> i64 {
        match self {
            ErrorCode::InvalidParams => -32602,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::ToolFailure => -32000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: None,
            error: Some(ErrorObject {
                code: code.as_i64(),
                message: message.into(),
            }),
        }
    }

    pub fn method_not_found(id: impl Into<String>, method: &str) -> Self {
        Self::error(
            id,
            ErrorCode::MethodNotFound,
            format!("Method '{method}' not found"),
        )
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Sent once, unprompted, as soon as a connection is established.
pub fn server_identity() -> Response {
    Response::success(
        uuid::Uuid::new_v4().to_string(),
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
            },
            "capabilities": {
                "tools": {},
            },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_carries_exactly_one_of_result_or_error() {
        let ok = serde_json::to_value(Response::success("1", json!({"a": 1}))).unwrap();
        assert!(ok.get("result").is_some());
        assert!(ok.get("error").is_none());

        let err = serde_json::to_value(Response::method_not_found("2", "nope")).unwrap();
        assert!(err.get("result").is_none());
        assert_eq!(err["error"]["code"], -32601);
        assert_eq!(err["id"], "2");
    }

    #[test]
    fn envelope_without_params_decodes() {
        let env: Envelope =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":"a","method":"tools/list"}"#).unwrap();
        assert_eq!(env.method, "tools/list");
        assert!(env.params.is_none());
    }

    #[test]
    fn envelope_without_id_is_rejected() {
        let res = serde_json::from_str::<Envelope>(r#"{"jsonrpc":"2.0","method":"tools/list"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn identity_declares_tool_support() {
        let msg = server_identity();
        let result = msg.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);
        assert!(result["capabilities"]["tools"].is_object());
    }
}
