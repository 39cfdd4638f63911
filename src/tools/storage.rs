use super::{ToolContext, ToolResult, str_arg, success_result};
use crate::document::encode_base64;
use crate::mcp::errors::ToolFailure;
use serde_json::{Value, json};

pub async fn listar(ctx: &ToolContext, args: &Value) -> ToolResult {
    let bucket = str_arg(args, "bucket").unwrap_or_default();
    let path = str_arg(args, "path").unwrap_or_default();
    let objects = ctx
        .backend
        .list_objects(bucket, path)
        .await
        .map_err(|err| ToolFailure::storage(format!("failed to list files in {bucket}"), err))?;
    let entries = serde_json::to_value(objects)
        .map_err(|err| ToolFailure::Unexpected(err.to_string()))?;
    Ok(success_result(entries))
}

/// Returns the object as base64 text so binary content survives JSON.
pub async fn descargar(ctx: &ToolContext, args: &Value) -> ToolResult {
    let bucket = str_arg(args, "bucket").unwrap_or_default();
    let path = str_arg(args, "path").unwrap_or_default();
    let bytes = ctx
        .backend
        .download_object(bucket, path)
        .await
        .map_err(|err| ToolFailure::storage(format!("failed to download {bucket}/{path}"), err))?;
    tracing::debug!(bucket, path, size = bytes.len(), "downloaded object");
    let encoded = encode_base64(&bytes);
    Ok(json!({
        "content": [{"type": "text", "text": encoded}],
        "structuredContent": {
            "bucket": bucket,
            "path": path,
            "size_bytes": bytes.len()
        }
    }))
}
