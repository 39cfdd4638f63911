use super::{ToolContext, ToolResult, str_arg, success_result, trimmed_arg};
use crate::backend::{Filter, SelectQuery};
use crate::mcp::errors::ToolFailure;
use serde_json::{Value, json};

const TABLE: &str = "empresas";
const LINK_TABLE: &str = "user_empresas";
const SEARCH_COLUMNS: [&str; 2] = ["nombre", "ruc"];

pub async fn listar(ctx: &ToolContext, args: &Value) -> ToolResult {
    let query = SelectQuery::table(LINK_TABLE)
        .columns("empresa_id,empresas(*)")
        .eq_opt("user_id", str_arg(args, "user_id"));
    let links = ctx
        .backend
        .select(&query)
        .await
        .map_err(|err| ToolFailure::backend("failed to list companies", err))?;
    let companies: Vec<Value> = links
        .into_iter()
        .filter_map(|mut link| link.get_mut(TABLE).map(Value::take))
        .filter(|company| !company.is_null())
        .collect();
    Ok(success_result(Value::Array(companies)))
}

pub async fn obtener(ctx: &ToolContext, args: &Value) -> ToolResult {
    let id = str_arg(args, "empresa_id").unwrap_or_default();
    let row = ctx
        .backend
        .select_one(&SelectQuery::table(TABLE).eq("id", id))
        .await
        .map_err(|err| ToolFailure::backend("failed to get company", err))?;
    Ok(success_result(row))
}

pub async fn buscar(ctx: &ToolContext, args: &Value) -> ToolResult {
    let term = str_arg(args, "query").unwrap_or_default();
    let mut query = SelectQuery::table(TABLE).search(&SEARCH_COLUMNS, term);

    if let Some(user_id) = str_arg(args, "user_id") {
        let ids = user_company_ids(ctx, user_id).await?;
        if ids.is_empty() {
            return Ok(success_result(json!([])));
        }
        query = query.in_list("id", ids);
    }

    let rows = ctx
        .backend
        .select(&query)
        .await
        .map_err(|err| ToolFailure::backend("failed to search companies", err))?;
    Ok(success_result(Value::Array(rows)))
}

async fn user_company_ids(ctx: &ToolContext, user_id: &str) -> Result<Vec<String>, ToolFailure> {
    let links = ctx
        .backend
        .select(
            &SelectQuery::table(LINK_TABLE)
                .columns("empresa_id")
                .eq("user_id", user_id),
        )
        .await
        .map_err(|err| ToolFailure::backend("failed to load the user's companies", err))?;
    Ok(links
        .iter()
        .filter_map(|link| link.get("empresa_id"))
        .filter_map(id_text)
        .collect())
}

/// Inserts the company, then links it to `user_id`. A failed link deletes the
/// company again so no orphan is left behind.
pub async fn crear(ctx: &ToolContext, args: &Value) -> ToolResult {
    let row = json!({
        "nombre": trimmed_arg(args, "nombre").unwrap_or_default(),
        "ruc": trimmed_arg(args, "ruc"),
        "direccion": trimmed_arg(args, "direccion"),
        "telefono": trimmed_arg(args, "telefono"),
        "email": trimmed_arg(args, "email"),
        "activa": true,
    });
    let company = ctx
        .backend
        .insert(TABLE, row)
        .await
        .map_err(|err| ToolFailure::backend("failed to create company", err))?;

    let Some(user_id) = str_arg(args, "user_id") else {
        return Ok(success_result(company));
    };
    let company_id = company
        .get("id")
        .and_then(id_text)
        .ok_or_else(|| ToolFailure::Unexpected("created company has no id".to_string()))?;

    let link = json!({ "user_id": user_id, "empresa_id": company_id });
    if let Err(link_error) = ctx.backend.insert(LINK_TABLE, link).await {
        let filters = [Filter::Eq {
            column: "id".to_string(),
            value: company_id.clone(),
        }];
        if let Err(rollback_error) = ctx.backend.delete(TABLE, &filters).await {
            tracing::warn!(
                company_id = %company_id,
                error = %rollback_error,
                "failed to roll back company after link failure"
            );
        }
        return Err(ToolFailure::backend(
            "failed to link company to user",
            link_error,
        ));
    }

    tracing::info!(company_id = %company_id, user_id, "company created");
    Ok(success_result(company))
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
