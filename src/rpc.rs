//! Line-delimited JSON-RPC 2.0 used to talk to the host process.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// Failure of an `execute` operation.
pub const OPERATION_FAILED: i64 = -32000;

#[derive(Debug, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

impl Request {
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Serialize)]
pub struct Response {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl Response {
    pub fn result(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Successful `execute` result, wrapped the way the host expects.
    pub fn operation(id: Value, data: Value) -> Self {
        Self::result(
            id,
            json!({ "success": true, "data": data, "message": null }),
        )
    }

    pub fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_without_params() {
        let req: Request =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"shutdown","id":3}"#).unwrap();
        assert_eq!(req.method, "shutdown");
        assert_eq!(req.id, 3);
        assert_eq!(req.param_str("data_dir"), None);
    }

    #[test]
    fn operation_result_is_wrapped() {
        let resp = serde_json::to_value(Response::operation(json!(1), json!({ "count": 2 }))).unwrap();
        assert_eq!(
            resp,
            json!({
                "jsonrpc": "2.0",
                "result": { "success": true, "data": { "count": 2 }, "message": null },
                "id": 1
            })
        );
    }

    #[test]
    fn error_omits_result() {
        let resp = serde_json::to_value(Response::error(json!("a"), OPERATION_FAILED, "nope")).unwrap();
        assert_eq!(
            resp,
            json!({ "jsonrpc": "2.0", "error": { "code": -32000, "message": "nope" }, "id": "a" })
        );
    }
}
