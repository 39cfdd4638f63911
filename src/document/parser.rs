//! Turns the model's free-form reply into a stable record.
//!
//! Two shapes are accepted: a narrative followed by `PARTE 2:` and a
//! `;`-delimited header/value table, or a single JSON object. Values are
//! passed through as reported, including `ND` sentinels.

use super::prompt::{DELIMITER, REQUIRED_HEADERS};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static TABLE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)PARTE\s*2\s*:").expect("valid regex"));

pub type Table = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("reply is empty")]
    Empty,

    #[error("reply has no table marker and is not valid JSON: {0}")]
    NotJson(String),

    #[error("reply has no table marker and its JSON is not an object")]
    NotAnObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedExtraction {
    #[serde(rename = "resumen_clinico")]
    pub clinical_summary: String,
    #[serde(rename = "csv")]
    pub tabular_block: Option<String>,
    #[serde(rename = "csv_parseado")]
    pub parsed_table: Option<Table>,
}

pub fn parse(text: &str) -> Result<ParsedExtraction, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    if let Some(marker) = TABLE_MARKER.find(text) {
        let block = text[marker.end()..].trim().to_string();
        return Ok(ParsedExtraction {
            clinical_summary: text[..marker.start()].trim().to_string(),
            parsed_table: parse_table(&block),
            tabular_block: Some(block),
        });
    }

    parse_json(text)
}

/// Finds the header line and zips it with the next non-empty line.
pub fn parse_table(block: &str) -> Option<Table> {
    let mut lines = block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("```"));
    let header_line =
        lines.find(|line| REQUIRED_HEADERS.iter().all(|header| line.contains(header)))?;
    let values_line = lines.next()?;
    let values: Vec<&str> = values_line.split(DELIMITER).map(str::trim).collect();
    let table: Table = header_line
        .split(DELIMITER)
        .map(str::trim)
        .enumerate()
        .filter(|(_, header)| !header.is_empty())
        .map(|(index, header)| {
            let value = values.get(index).copied().unwrap_or_default();
            (header.to_string(), value.to_string())
        })
        .collect();
    (!table.is_empty()).then_some(table)
}

fn parse_json(text: &str) -> Result<ParsedExtraction, ParseError> {
    let value: Value = serde_json::from_str(strip_fence(text))
        .map_err(|err| ParseError::NotJson(err.to_string()))?;
    let Value::Object(object) = value else {
        return Err(ParseError::NotAnObject);
    };

    let summary = object.get("resumen_clinico").and_then(Value::as_str);
    let block = object.get("csv").and_then(Value::as_str);
    let parsed = object.get("csv_parseado");

    if summary.is_some() || block.is_some() || parsed.is_some() {
        let parsed_table = match parsed {
            Some(Value::Object(table)) => flat_table(table),
            _ => block.and_then(parse_table),
        };
        return Ok(ParsedExtraction {
            clinical_summary: summary.unwrap_or(text.trim()).to_string(),
            tabular_block: block.map(str::to_string),
            parsed_table,
        });
    }

    Ok(ParsedExtraction {
        clinical_summary: text.trim().to_string(),
        tabular_block: None,
        parsed_table: flat_table(&object),
    })
}

/// An object of scalars read as header -> value; anything nested is not a
/// table.
fn flat_table(object: &Map<String, Value>) -> Option<Table> {
    if object.is_empty() {
        return None;
    }
    object
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                Value::Null => String::new(),
                Value::Array(_) | Value::Object(_) => return None,
            };
            Some((key.clone(), value))
        })
        .collect()
}

fn strip_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = "PARTE 1: RESUMEN CLÍNICO\n- Apto sin restricciones\n\n\
        PARTE 2: BLOQUE CSV\n```csv\n\
        Fecha_EMO; Centro_Medico ;Tipo_Examen;;DNI\n\n\
        2024-03-01; Clinica Norte;Anual;x\n```\n";

    #[test]
    fn splits_summary_and_zips_table() {
        let parsed = parse(REPLY).expect("parsed");
        assert_eq!(parsed.clinical_summary, "PARTE 1: RESUMEN CLÍNICO\n- Apto sin restricciones");
        assert!(parsed.tabular_block.as_deref().unwrap_or_default().starts_with("BLOQUE CSV"));

        let table = parsed.parsed_table.expect("table");
        assert_eq!(table.len(), 4);
        assert_eq!(table["Fecha_EMO"], "2024-03-01");
        assert_eq!(table["Centro_Medico"], "Clinica Norte");
        assert_eq!(table["Tipo_Examen"], "Anual");
        // Missing trailing value.
        assert_eq!(table["DNI"], "");
    }

    #[test]
    fn marker_is_case_insensitive_and_spacing_tolerant() {
        let parsed = parse("resumen\nparte 2 :\nFecha_EMO;Centro_Medico\nND;ND").expect("parsed");
        assert_eq!(parsed.clinical_summary, "resumen");
        let table = parsed.parsed_table.expect("table");
        assert_eq!(table["Fecha_EMO"], "ND");
        assert_eq!(table["Centro_Medico"], "ND");
    }

    #[test]
    fn marker_without_header_line_gives_no_table() {
        let parsed = parse("resumen PARTE 2: no hay tabla").expect("parsed");
        assert_eq!(parsed.tabular_block.as_deref(), Some("no hay tabla"));
        assert_eq!(parsed.parsed_table, None);
    }

    #[test]
    fn header_without_value_line_gives_no_table() {
        assert_eq!(parse_table("Fecha_EMO;Centro_Medico\n```"), None);
    }

    #[test]
    fn flat_json_becomes_table() {
        let reply = "```json\n{\"Fecha_EMO\": \"2024-01-01\", \"Edad\": 41, \"Apto\": true}\n```";
        let parsed = parse(reply).expect("parsed");
        let table = parsed.parsed_table.expect("table");
        assert_eq!(table["Fecha_EMO"], "2024-01-01");
        assert_eq!(table["Edad"], "41");
        assert_eq!(table["Apto"], "true");
        assert_eq!(parsed.tabular_block, None);
    }

    #[test]
    fn json_with_known_fields_is_honored() {
        let parsed = parse(
            r#"{"resumen_clinico": "Apto", "csv": "Fecha_EMO;Centro_Medico\n2024;Norte", "csv_parseado": null}"#,
        )
        .expect("parsed");
        assert_eq!(parsed.clinical_summary, "Apto");
        let table = parsed.parsed_table.expect("table from csv");
        assert_eq!(table["Centro_Medico"], "Norte");
    }

    #[test]
    fn nested_json_has_no_table() {
        let parsed = parse(r#"{"paciente": {"dni": "1"}}"#).expect("parsed");
        assert_eq!(parsed.parsed_table, None);
    }

    #[test]
    fn non_json_without_marker_is_an_error() {
        assert!(matches!(parse("solo texto libre"), Err(ParseError::NotJson(_))));
        assert_eq!(parse("[1, 2]"), Err(ParseError::NotAnObject));
        assert_eq!(parse("  "), Err(ParseError::Empty));
    }
}
