//! JSON-RPC 2.0 dispatch shared by the stdio and HTTP transports.

use crate::mcp::contracts::PROTOCOL_VERSION;
use crate::mcp::errors::{
    JSONRPC_INTERNAL_ERROR, JSONRPC_INVALID_PARAMS, JSONRPC_INVALID_REQUEST,
    JSONRPC_METHOD_NOT_FOUND, JSONRPC_PARSE_ERROR, UNEXPECTED_ERROR, UNKNOWN_TOOL,
};
use crate::tools::{ToolRouter, UnknownTool};
use serde::Serialize;
use serde_json::{Value, json};
use std::any::Any;
use std::sync::Arc;
use tokio::task::AbortHandle;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data,
            }),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<ToolRouter>,
}

impl Dispatcher {
    pub fn new(router: ToolRouter) -> Self {
        Self {
            router: Arc::new(router),
        }
    }

    pub fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// Parses one raw message. `None` means the message was a notification.
    pub async fn handle_str(&self, raw: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<Value>(raw) {
            Ok(request) => self.handle(request).await,
            Err(err) => {
                tracing::debug!(error = %err, "unparseable request");
                Some(JsonRpcResponse::failure(
                    Value::Null,
                    JSONRPC_PARSE_ERROR,
                    "Parse error",
                    None,
                ))
            }
        }
    }

    pub async fn handle(&self, request: Value) -> Option<JsonRpcResponse> {
        let Some(obj) = request.as_object() else {
            return Some(invalid_request(Value::Null, "request must be an object"));
        };
        let id = obj.get("id").cloned();
        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Some(invalid_request(
                id.unwrap_or(Value::Null),
                "jsonrpc must be \"2.0\"",
            ));
        }
        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            return Some(invalid_request(
                id.unwrap_or(Value::Null),
                "method must be a string",
            ));
        };
        let Some(id) = id else {
            tracing::debug!(method, "notification ignored");
            return None;
        };

        let response = match method {
            "initialize" => JsonRpcResponse::success(id, initialize_result()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(
                id,
                json!({ "tools": self.router.descriptors() }),
            ),
            "resources/list" => JsonRpcResponse::success(id, json!({ "resources": [] })),
            "tools/call" => self.call_tool(id, obj.get("params")).await,
            other => {
                tracing::info!(method = other, "unknown method");
                JsonRpcResponse::failure(
                    id,
                    JSONRPC_METHOD_NOT_FOUND,
                    format!("Method not found: {other}"),
                    None,
                )
            }
        };
        Some(response)
    }

    async fn call_tool(&self, id: Value, params: Option<&Value>) -> JsonRpcResponse {
        let Some(name) = params
            .and_then(|params| params.get("name"))
            .and_then(Value::as_str)
        else {
            return JsonRpcResponse::failure(
                id,
                JSONRPC_INVALID_PARAMS,
                "params.name must be a string",
                None,
            );
        };
        if !self.router.contains(name) {
            return unknown_tool(id, &UnknownTool(name.to_string()));
        }
        let args = params
            .and_then(|params| params.get("arguments"))
            .filter(|args| !args.is_null())
            .cloned()
            .unwrap_or_else(|| json!({}));

        let router = Arc::clone(&self.router);
        let tool = name.to_string();
        let started = std::time::Instant::now();
        let task = tokio::spawn(async move { router.call(&tool, args).await });
        let _abort = AbortOnDrop(task.abort_handle());
        let outcome = task.await;
        tracing::debug!(
            tool = name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tool call finished"
        );

        match outcome {
            Ok(Ok(result)) => JsonRpcResponse::success(id, result),
            Ok(Err(unknown)) => unknown_tool(id, &unknown),
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    "tool task was cancelled".to_string()
                };
                tracing::error!(tool = name, error = %message, "tool call panicked");
                JsonRpcResponse::failure(
                    id,
                    JSONRPC_INTERNAL_ERROR,
                    "Internal error",
                    Some(json!({ "error_code": UNEXPECTED_ERROR, "message": message })),
                )
            }
        }
    }
}

/// Cancels the tool task when the caller stops waiting for its response.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {}
        },
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn invalid_request(id: Value, message: &str) -> JsonRpcResponse {
    JsonRpcResponse::failure(id, JSONRPC_INVALID_REQUEST, "Invalid Request", Some(json!(message)))
}

fn unknown_tool(id: Value, unknown: &UnknownTool) -> JsonRpcResponse {
    tracing::info!(tool = %unknown.0, "unknown tool");
    JsonRpcResponse::failure(
        id,
        JSONRPC_METHOD_NOT_FOUND,
        unknown.to_string(),
        Some(json!({ "error_code": UNKNOWN_TOOL, "tool": unknown.0 })),
    )
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "tool panicked".to_string()
    }
}
