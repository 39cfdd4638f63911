use super::{ToolContext, ToolResult, str_arg, success_result, u64_arg};
use crate::backend::SelectQuery;
use crate::mcp::contracts::DEFAULT_LIMIT;
use crate::mcp::errors::ToolFailure;
use serde_json::Value;

const TABLE: &str = "registros_trabajadores";
const PROFILE_COLUMNS: &str = "id,fecha_registro,apellidos_nombre,dni_ce_pas,telefono_trabajador,\
sexo,jornada_laboral,puesto_trabajo,empresa,gerencia,supervisor_responsable,\
telf_contacto_supervisor,empresa_id,created_at";

pub async fn listar(ctx: &ToolContext, args: &Value) -> ToolResult {
    let query = SelectQuery::table(TABLE)
        .eq_opt("empresa_id", str_arg(args, "empresa_id"))
        .order_desc("fecha_registro")
        .limit(u64_arg(args, "limit").unwrap_or(DEFAULT_LIMIT))
        .offset(u64_arg(args, "offset").unwrap_or(0));
    let rows = ctx
        .backend
        .select(&query)
        .await
        .map_err(|err| ToolFailure::backend("failed to list workers", err))?;
    Ok(success_result(Value::Array(rows)))
}

pub async fn obtener(ctx: &ToolContext, args: &Value) -> ToolResult {
    let dni = str_arg(args, "dni").unwrap_or_default().trim();
    let query = SelectQuery::table(TABLE)
        .columns(PROFILE_COLUMNS)
        .eq("dni_ce_pas", dni);
    let row = ctx
        .backend
        .select_one(&query)
        .await
        .map_err(|err| ToolFailure::backend("failed to get worker", err))?;
    Ok(success_result(row))
}
