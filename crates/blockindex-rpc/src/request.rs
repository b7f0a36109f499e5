//! JSON-RPC 2.0 envelope types shared by both sources.

use blockindex_core::FetchError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request/response correlation ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcId {
    Number(u64),
    String(String),
    Null,
}

impl Default for RpcId {
    fn default() -> Self {
        Self::Null
    }
}

/// Outbound call. Both sources always use id 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: RpcId,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id: RpcId::Number(1),
        }
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Inbound response. `result` is kept untyped; each fetcher decodes its own shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: RpcId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The `result` value, or the protocol error the node reported.
    ///
    /// A missing or `null` result is an error too: the node does not have the
    /// requested block yet.
    pub fn into_result(self) -> Result<Value, FetchError> {
        if let Some(err) = self.error {
            return Err(FetchError::Protocol {
                code: err.code,
                message: err.message,
            });
        }
        match self.result {
            None | Some(Value::Null) => Err(FetchError::no_result()),
            Some(v) => Ok(v),
        }
    }
}
