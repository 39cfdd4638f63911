//! Tool registry and the shared invocation flow:
//! validate -> cache lookup -> execute -> cache store.

use crate::backend::Backend;
use crate::cache::{ToolCache, cache_key};
use crate::document::DocumentAnalyzer;
use crate::mcp::contracts::*;
use crate::mcp::errors::ToolFailure;
use crate::mcp::{self, ToolSpec};
use jsonschema::{Draft, Validator};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

pub mod casos;
pub mod empresas;
pub mod examenes;
pub mod storage;
pub mod trabajadores;

pub type ToolResult = Result<Value, ToolFailure>;

/// Collaborators shared by every handler, built once at startup.
pub struct ToolContext {
    pub backend: Arc<dyn Backend>,
    pub analyzer: Arc<DocumentAnalyzer>,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid input schema for {tool}: {message}")]
pub struct RegistryError {
    pub tool: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tool: {0}")]
pub struct UnknownTool(pub String);

struct RegisteredTool {
    spec: &'static ToolSpec,
    validator: Validator,
}

pub struct ToolRouter {
    tools: HashMap<&'static str, RegisteredTool>,
    ctx: ToolContext,
    cache: Arc<ToolCache>,
}

impl ToolRouter {
    /// Compiles every input schema up front; a broken schema fails startup.
    pub fn new(ctx: ToolContext, cache: Arc<ToolCache>) -> Result<Self, RegistryError> {
        let mut tools = HashMap::with_capacity(mcp::TOOLS.len());
        for spec in mcp::TOOLS {
            let validator = jsonschema::options()
                .with_draft(Draft::Draft202012)
                .build(&(spec.input_schema)())
                .map_err(|err| RegistryError {
                    tool: spec.name,
                    message: err.to_string(),
                })?;
            tools.insert(spec.name, RegisteredTool { spec, validator });
        }
        Ok(Self { tools, ctx, cache })
    }

    pub fn descriptors(&self) -> Vec<Value> {
        mcp::tool_definitions()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn cache(&self) -> &ToolCache {
        &self.cache
    }

    /// Runs a tool and returns its envelope. Only an unknown name is an `Err`;
    /// tool failures come back as `isError` envelopes.
    pub async fn call(&self, name: &str, args: Value) -> Result<Value, UnknownTool> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| UnknownTool(name.to_string()))?;

        let errors: Vec<String> = tool
            .validator
            .iter_errors(&args)
            .map(|err| err.to_string())
            .collect();
        if !errors.is_empty() {
            tracing::info!(tool = name, errors = ?errors, "tool arguments rejected");
            return Ok(ToolFailure::Validation(errors).into_envelope());
        }

        let key = tool.spec.cacheable.then(|| cache_key(name, &args));
        if let Some(key) = &key
            && let Some(hit) = self.cache.get(key)
        {
            tracing::debug!(tool = name, "cache hit");
            return Ok(hit);
        }

        match execute(&self.ctx, name, args).await {
            Ok(result) => {
                if let Some(key) = key {
                    self.cache.insert(key, result.clone());
                }
                Ok(result)
            }
            Err(failure) => {
                tracing::warn!(
                    tool = name,
                    code = %failure.code(),
                    error = %failure,
                    "tool failed"
                );
                Ok(failure.into_envelope())
            }
        }
    }
}

async fn execute(ctx: &ToolContext, name: &str, args: Value) -> ToolResult {
    match name {
        TOOL_CASOS_LISTAR => casos::listar(ctx, &args).await,
        TOOL_CASOS_OBTENER => casos::obtener(ctx, &args).await,
        TOOL_CASOS_BUSCAR => casos::buscar(ctx, &args).await,
        TOOL_TRABAJADORES_LISTAR => trabajadores::listar(ctx, &args).await,
        TOOL_TRABAJADORES_OBTENER => trabajadores::obtener(ctx, &args).await,
        TOOL_EXAMENES_LISTAR => examenes::listar(ctx, &args).await,
        TOOL_EXAMENES_ANALIZAR => examenes::analizar(ctx, &args).await,
        TOOL_EXAMENES_REGISTRAR => examenes::registrar(ctx, &args).await,
        TOOL_EMPRESAS_LISTAR => empresas::listar(ctx, &args).await,
        TOOL_EMPRESAS_OBTENER => empresas::obtener(ctx, &args).await,
        TOOL_EMPRESAS_BUSCAR => empresas::buscar(ctx, &args).await,
        TOOL_EMPRESAS_CREAR => empresas::crear(ctx, &args).await,
        TOOL_STORAGE_LISTAR => storage::listar(ctx, &args).await,
        TOOL_STORAGE_DESCARGAR => storage::descargar(ctx, &args).await,
        other => Err(ToolFailure::Unexpected(format!(
            "no handler registered for {other}"
        ))),
    }
}

/// Success envelope: pretty JSON as text plus the same data as
/// `structuredContent` (arrays are wrapped in `{items}`).
pub fn success_result(data: Value) -> Value {
    let text = serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());
    let structured = match data {
        Value::Object(_) => data,
        other => json!({ "items": other }),
    };
    json!({
        "content": [{"type": "text", "text": text}],
        "structuredContent": structured
    })
}

pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

pub(crate) fn u64_arg(args: &Value, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

/// Trimmed string argument; blank counts as absent.
pub(crate) fn trimmed_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    str_arg(args, key)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
