use super::{ToolContext, ToolResult, str_arg, success_result, u64_arg};
use crate::backend::SelectQuery;
use crate::mcp::contracts::{DEFAULT_LIMIT, SEARCH_LIMIT};
use crate::mcp::errors::ToolFailure;
use serde_json::Value;

const TABLE: &str = "casos";
const SEARCH_COLUMNS: [&str; 3] = ["trabajadorNombre", "dni", "empresa"];

pub async fn listar(ctx: &ToolContext, args: &Value) -> ToolResult {
    let query = SelectQuery::table(TABLE)
        .eq_opt("status", str_arg(args, "status"))
        .eq_opt("empresa_id", str_arg(args, "empresa_id"))
        .order_desc("fecha")
        .limit(u64_arg(args, "limit").unwrap_or(DEFAULT_LIMIT));
    let rows = ctx
        .backend
        .select(&query)
        .await
        .map_err(|err| ToolFailure::backend("failed to list cases", err))?;
    Ok(success_result(Value::Array(rows)))
}

pub async fn obtener(ctx: &ToolContext, args: &Value) -> ToolResult {
    let id = str_arg(args, "id").unwrap_or_default();
    let row = ctx
        .backend
        .select_one(&SelectQuery::table(TABLE).eq("id", id))
        .await
        .map_err(|err| ToolFailure::backend("failed to get case", err))?;
    Ok(success_result(row))
}

pub async fn buscar(ctx: &ToolContext, args: &Value) -> ToolResult {
    let term = str_arg(args, "query").unwrap_or_default();
    let query = SelectQuery::table(TABLE)
        .search(&SEARCH_COLUMNS, term)
        .limit(SEARCH_LIMIT);
    let rows = ctx
        .backend
        .select(&query)
        .await
        .map_err(|err| ToolFailure::backend("failed to search cases", err))?;
    Ok(success_result(Value::Array(rows)))
}
