use super::{ToolContext, ToolResult, str_arg, success_result, trimmed_arg, u64_arg};
use crate::backend::SelectQuery;
use crate::document::{AnalysisRequest, prompt::NOT_AVAILABLE};
use crate::mcp::contracts::DEFAULT_LIMIT;
use crate::mcp::errors::ToolFailure;
use serde_json::{Map, Value, json};

const TABLE: &str = "examenes_medicos";
const HISTORY_TABLE: &str = "analisis_emo_historial";
const DEFAULT_EXAM_TYPE: &str = "Anual";

/// Extracted columns copied onto the exam row when they carry a value.
const OPTIONAL_COLUMNS: [(&str, &str); 8] = [
    ("PA_Sistolica", "pa_sistolica"),
    ("PA_Diastolica", "pa_diastolica"),
    ("FC", "fc"),
    ("IMC", "imc"),
    ("FVC_Valor", "fvc"),
    ("FEV1_Valor", "fev1"),
    ("Dx_Audio", "diagnostico_audio"),
    ("Dx_Oftalmo", "diagnostico_oftalmo"),
];

const RESTRICTION_COLUMNS: [(&str, &str); 3] = [
    ("Restr_Lentes", "restriccion_lentes"),
    ("Restr_Altura_1.8m", "restriccion_altura"),
    ("Restr_Elec", "restriccion_electricidad"),
];

pub async fn listar(ctx: &ToolContext, args: &Value) -> ToolResult {
    let query = SelectQuery::table(TABLE)
        .eq_opt("trabajador_id", str_arg(args, "trabajador_id"))
        .eq_opt("empresa_id", str_arg(args, "empresa_id"))
        .order_desc("fecha_examen")
        .limit(u64_arg(args, "limit").unwrap_or(DEFAULT_LIMIT))
        .offset(u64_arg(args, "offset").unwrap_or(0));
    let rows = ctx
        .backend
        .select(&query)
        .await
        .map_err(|err| ToolFailure::backend("failed to list exams", err))?;
    Ok(success_result(Value::Array(rows)))
}

pub async fn analizar(ctx: &ToolContext, args: &Value) -> ToolResult {
    let request = AnalysisRequest {
        pdf_base64: str_arg(args, "pdf_base64").unwrap_or_default().to_string(),
        use_thinking: args
            .get("use_thinking")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        max_attempts: None,
    };
    let record = ctx.analyzer.analyze(&request).await?;
    let data =
        serde_json::to_value(record).map_err(|err| ToolFailure::Unexpected(err.to_string()))?;
    Ok(success_result(data))
}

/// Stores an exam built from an extracted table. The history row is written
/// afterwards and only logged when it fails.
pub async fn registrar(ctx: &ToolContext, args: &Value) -> ToolResult {
    let empty = Map::new();
    let table = args
        .get("csv_parseado")
        .and_then(Value::as_object)
        .unwrap_or(&empty);
    let row = exam_row(args, table);

    let exam = ctx
        .backend
        .insert(TABLE, row)
        .await
        .map_err(|err| ToolFailure::backend("failed to register exam", err))?;
    tracing::info!(exam_id = ?exam.get("id"), "exam registered");

    let history = history_row(args, table);
    let history_saved = match ctx.backend.insert(HISTORY_TABLE, history).await {
        Ok(_) => true,
        Err(err) => {
            tracing::warn!(error = %err, "failed to store analysis history");
            false
        }
    };

    Ok(success_result(json!({
        "examen": exam,
        "historial_guardado": history_saved
    })))
}

fn exam_row(args: &Value, table: &Map<String, Value>) -> Value {
    let mut row = Map::new();
    row.insert("trabajador_id".into(), json!(str_arg(args, "trabajador_id")));
    row.insert("empresa_id".into(), json!(str_arg(args, "empresa_id")));
    if let Some(date) = cell(table, "Fecha_EMO").and_then(normalize_date) {
        row.insert("fecha_examen".into(), json!(date));
    }
    row.insert(
        "tipo_examen".into(),
        json!(cell(table, "Tipo_Examen").unwrap_or(DEFAULT_EXAM_TYPE)),
    );
    row.insert(
        "aptitud".into(),
        json!(cell(table, "Aptitud_Final").unwrap_or(NOT_AVAILABLE)),
    );
    for (header, column) in RESTRICTION_COLUMNS {
        let restricted = cell(table, header).is_some_and(|value| value.eq_ignore_ascii_case("SI"));
        row.insert(column.into(), json!(restricted));
    }
    for (header, column) in OPTIONAL_COLUMNS {
        if let Some(value) = cell(table, header) {
            row.insert(column.into(), json!(value));
        }
    }
    row.insert("datos_extractos".into(), Value::Object(table.clone()));
    if let Some(file) = trimmed_arg(args, "archivo_pdf") {
        row.insert("archivo_pdf".into(), json!(file));
    }
    Value::Object(row)
}

fn history_row(args: &Value, table: &Map<String, Value>) -> Value {
    let file = trimmed_arg(args, "archivo_pdf");
    let result = args
        .get("resultado_analisis")
        .cloned()
        .unwrap_or_else(|| json!({ "csv_parseado": table }));
    json!({
        "empresa_id": str_arg(args, "empresa_id"),
        "trabajador_dni": cell(table, "DNI"),
        "trabajador_nombre": cell(table, "Nombre"),
        "archivo_nombre": file.map(file_name),
        "archivo_url": file,
        "resultado_analisis": result,
        "usuario_id": str_arg(args, "usuario_id"),
    })
}

/// Non-empty table value, with the "not available" marker treated as empty.
fn cell<'a>(table: &'a Map<String, Value>, header: &str) -> Option<&'a str> {
    table
        .get(header)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty() && *value != NOT_AVAILABLE)
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Accepts `YYYY-MM-DD`, `DD/MM/YYYY` and `DD-MM-YYYY`; returns ISO format.
fn normalize_date(raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw.split(['/', '-']).map(str::trim).collect();
    let [a, b, c] = parts.as_slice() else {
        return None;
    };
    let (year, month, day) = if a.len() == 4 { (*a, *b, *c) } else { (*c, *b, *a) };
    let year: u16 = year.parse().ok().filter(|_| year.len() == 4)?;
    let month: u8 = month.parse().ok().filter(|m| (1..=12).contains(m))?;
    let day: u8 = day.parse().ok().filter(|d| (1..=31).contains(d))?;
    Some(format!("{year:04}-{month:02}-{day:02}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn normalizes_common_date_layouts() {
        assert_eq!(normalize_date("2024-03-15").as_deref(), Some("2024-03-15"));
        assert_eq!(normalize_date("15/03/2024").as_deref(), Some("2024-03-15"));
        assert_eq!(normalize_date("5-3-2024").as_deref(), Some("2024-03-05"));
        assert_eq!(normalize_date("ND"), None);
        assert_eq!(normalize_date("32/01/2024"), None);
        assert_eq!(normalize_date("15/03/24"), None);
    }

    #[test]
    fn exam_row_maps_restrictions_and_defaults() {
        let args = json!({
            "trabajador_id": "t-1",
            "empresa_id": "e-1",
            "archivo_pdf": " emos/2024/juan.pdf "
        });
        let table = table(&[
            ("Fecha_EMO", "15/03/2024"),
            ("Restr_Lentes", "si"),
            ("Restr_Altura_1.8m", "NO"),
            ("IMC", "24.5"),
            ("FVC_Valor", "ND"),
            ("Aptitud_Final", ""),
        ]);
        let row = exam_row(&args, &table);

        assert_eq!(row["fecha_examen"], "2024-03-15");
        assert_eq!(row["tipo_examen"], DEFAULT_EXAM_TYPE);
        assert_eq!(row["aptitud"], NOT_AVAILABLE);
        assert_eq!(row["restriccion_lentes"], true);
        assert_eq!(row["restriccion_altura"], false);
        assert_eq!(row["restriccion_electricidad"], false);
        assert_eq!(row["imc"], "24.5");
        assert!(row.get("fvc").is_none());
        assert_eq!(row["archivo_pdf"], "emos/2024/juan.pdf");
        assert_eq!(row["datos_extractos"]["IMC"], "24.5");
    }

    #[test]
    fn exam_row_omits_unparseable_date() {
        let row = exam_row(&json!({}), &table(&[("Fecha_EMO", "marzo 2024")]));
        assert!(row.get("fecha_examen").is_none());
    }

    #[test]
    fn history_row_defaults_to_parsed_table() {
        let args = json!({ "empresa_id": "e-1", "archivo_pdf": "emos/juan.pdf" });
        let table = table(&[("DNI", "12345678"), ("Nombre", "Juan Perez")]);
        let row = history_row(&args, &table);

        assert_eq!(row["trabajador_dni"], "12345678");
        assert_eq!(row["trabajador_nombre"], "Juan Perez");
        assert_eq!(row["archivo_nombre"], "juan.pdf");
        assert_eq!(row["archivo_url"], "emos/juan.pdf");
        assert_eq!(row["resultado_analisis"]["csv_parseado"]["DNI"], "12345678");
        assert!(row["usuario_id"].is_null());
    }
}
