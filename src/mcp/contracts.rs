use serde_json::{Value, json};

pub const TOOL_CASOS_LISTAR: &str = "casos_listar";
pub const TOOL_CASOS_OBTENER: &str = "casos_obtener";
pub const TOOL_CASOS_BUSCAR: &str = "casos_buscar";
pub const TOOL_TRABAJADORES_LISTAR: &str = "trabajadores_listar";
pub const TOOL_TRABAJADORES_OBTENER: &str = "trabajadores_obtener";
pub const TOOL_EXAMENES_LISTAR: &str = "examenes_listar";
pub const TOOL_EXAMENES_ANALIZAR: &str = "examenes_analizar";
pub const TOOL_EXAMENES_REGISTRAR: &str = "examenes_registrar";
pub const TOOL_EMPRESAS_LISTAR: &str = "empresas_listar";
pub const TOOL_EMPRESAS_OBTENER: &str = "empresas_obtener";
pub const TOOL_EMPRESAS_BUSCAR: &str = "empresas_buscar";
pub const TOOL_EMPRESAS_CREAR: &str = "empresas_crear";
pub const TOOL_STORAGE_LISTAR: &str = "storage_listar";
pub const TOOL_STORAGE_DESCARGAR: &str = "storage_descargar";

pub const PROTOCOL_VERSION: &str = "2025-11-25";

pub const DEFAULT_LIMIT: u64 = 100;
pub const MAX_LIMIT: u64 = 1000;
pub const SEARCH_LIMIT: u64 = 50;

const UUID_PATTERN: &str =
    "^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$";
const EMAIL_PATTERN: &str = "^[^@\\s]+@[^@\\s]+\\.[^@\\s]+$";

fn uuid(description: &str) -> Value {
    json!({ "type": "string", "pattern": UUID_PATTERN, "description": description })
}

fn limit() -> Value {
    json!({
        "type": "integer",
        "minimum": 1,
        "maximum": MAX_LIMIT,
        "default": DEFAULT_LIMIT,
        "description": "Maximum number of rows to return"
    })
}

fn offset() -> Value {
    json!({ "type": "integer", "minimum": 0, "default": 0 })
}

fn search_query() -> Value {
    json!({ "type": "string", "minLength": 1, "maxLength": 255 })
}

pub fn casos_listar_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "limit": limit(),
            "status": { "type": "string", "enum": ["ACTIVO", "CERRADO"] },
            "empresa_id": uuid("Company id, for multi-tenant filtering")
        },
        "additionalProperties": false
    })
}

pub fn casos_obtener_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "id": { "type": "string", "minLength": 1 }
        },
        "required": ["id"],
        "additionalProperties": false
    })
}

pub fn casos_buscar_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": search_query()
        },
        "required": ["query"],
        "additionalProperties": false
    })
}

pub fn trabajadores_listar_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "limit": limit(),
            "offset": offset(),
            "empresa_id": uuid("Company id, for multi-tenant filtering")
        },
        "additionalProperties": false
    })
}

pub fn trabajadores_obtener_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "dni": { "type": "string", "minLength": 1, "maxLength": 20 }
        },
        "required": ["dni"],
        "additionalProperties": false
    })
}

pub fn examenes_listar_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "limit": limit(),
            "offset": offset(),
            "trabajador_id": uuid("Worker id"),
            "empresa_id": uuid("Company id")
        },
        "additionalProperties": false
    })
}

pub fn examenes_analizar_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "pdf_base64": {
                "type": "string",
                "minLength": 1,
                "description": "EMO document as base64"
            },
            "use_thinking": {
                "type": "boolean",
                "default": false,
                "description": "Give the model a thinking budget for harder documents"
            }
        },
        "required": ["pdf_base64"],
        "additionalProperties": false
    })
}

pub fn examenes_registrar_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "trabajador_id": uuid("Worker id"),
            "empresa_id": uuid("Company id"),
            "csv_parseado": {
                "type": "object",
                "additionalProperties": { "type": "string" },
                "description": "Table extracted by examenes_analizar"
            },
            "archivo_pdf": { "type": "string", "maxLength": 500 },
            "resultado_analisis": {
                "type": "object",
                "description": "Full examenes_analizar output, kept in the analysis history"
            },
            "usuario_id": uuid("User registering the exam")
        },
        "required": ["trabajador_id", "empresa_id", "csv_parseado"],
        "additionalProperties": false
    })
}

pub fn empresas_listar_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "user_id": uuid("User whose companies are listed")
        },
        "additionalProperties": false
    })
}

pub fn empresas_obtener_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "empresa_id": uuid("Company id")
        },
        "required": ["empresa_id"],
        "additionalProperties": false
    })
}

pub fn empresas_buscar_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": search_query(),
            "user_id": uuid("Restrict the search to this user's companies")
        },
        "required": ["query"],
        "additionalProperties": false
    })
}

pub fn empresas_crear_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "nombre": { "type": "string", "minLength": 1, "maxLength": 255 },
            "ruc": { "type": "string", "maxLength": 20 },
            "direccion": { "type": "string", "maxLength": 500 },
            "telefono": { "type": "string", "maxLength": 20 },
            "email": { "type": "string", "maxLength": 255, "pattern": EMAIL_PATTERN },
            "user_id": uuid("User linked to the new company")
        },
        "required": ["nombre"],
        "additionalProperties": false
    })
}

pub fn storage_listar_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "bucket": { "type": "string", "minLength": 1, "maxLength": 100 },
            "path": { "type": "string", "maxLength": 500, "default": "" }
        },
        "required": ["bucket"],
        "additionalProperties": false
    })
}

pub fn storage_descargar_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "bucket": { "type": "string", "minLength": 1, "maxLength": 100 },
            "path": { "type": "string", "minLength": 1, "maxLength": 500 }
        },
        "required": ["bucket", "path"],
        "additionalProperties": false
    })
}
