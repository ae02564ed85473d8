//! JSON-RPC envelopes exchanged over a session

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Request body forwarded to the peer wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

impl RpcRequest {
    pub fn new(method: &str, params: Vec<Value>) -> Self {
        Self { method: method.into(), params }
    }

    pub fn bare(method: &str) -> Self { Self::new(method, Vec::new()) }
}

/// Structured error sent back to the peer instead of failing locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self { Self { code, message: message.into() } }

    pub fn invalid_method(method: &str) -> Self { Self::new(1001, format!("Invalid method: {method}")) }
    pub fn invalid_params(detail: &str) -> Self { Self::new(-32602, format!("Invalid params: {detail}")) }
    pub fn invalid_event(detail: &str) -> Self { Self::new(1002, format!("Invalid event: {detail}")) }
    pub fn unsupported_chains(detail: &str) -> Self { Self::new(5100, format!("Unsupported chains: {detail}")) }
    pub fn unsupported_accounts(detail: &str) -> Self { Self::new(5103, format!("Unsupported accounts: {detail}")) }
    pub fn unsupported_namespace_key(detail: &str) -> Self { Self::new(5104, format!("Unsupported namespace key: {detail}")) }
    pub fn user_disconnected() -> Self { Self::new(6000, "User disconnected.") }
    pub fn internal(detail: &str) -> Self { Self::new(-32000, detail.to_string()) }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Response correlated to a request id.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub id: u64,
    pub outcome: Result<Value, RpcError>,
}

impl RpcResponse {
    pub fn result(id: u64, value: Value) -> Self { Self { id, outcome: Ok(value) } }
    pub fn error(id: u64, error: RpcError) -> Self { Self { id, outcome: Err(error) } }

    pub fn is_error(&self) -> bool { self.outcome.is_err() }

    pub fn to_json(&self) -> Value {
        match &self.outcome {
            Ok(result) => json!({"jsonrpc": "2.0", "id": self.id, "result": result}),
            Err(error) => json!({"jsonrpc": "2.0", "id": self.id, "error": error}),
        }
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        let id = value.get("id")?.as_u64()?;
        if let Some(error) = value.get("error") {
            let error: RpcError = serde_json::from_value(error.clone()).ok()?;
            return Some(Self::error(id, error));
        }
        Some(Self::result(id, value.get("result").cloned().unwrap_or(Value::Null)))
    }
}
