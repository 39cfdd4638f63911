use serde_json::{Value, json};

pub mod contracts;
pub mod errors;

/// Static description of a callable tool.
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: fn() -> Value,
    /// Pure reads whose successful results may be memoized.
    pub cacheable: bool,
}

impl ToolSpec {
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": (self.input_schema)()
        })
    }
}

pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: contracts::TOOL_CASOS_LISTAR,
        description: "List modified-work cases, newest first.",
        input_schema: contracts::casos_listar_schema,
        cacheable: true,
    },
    ToolSpec {
        name: contracts::TOOL_CASOS_OBTENER,
        description: "Get a single case by id.",
        input_schema: contracts::casos_obtener_schema,
        cacheable: true,
    },
    ToolSpec {
        name: contracts::TOOL_CASOS_BUSCAR,
        description: "Search cases by worker name, DNI or company.",
        input_schema: contracts::casos_buscar_schema,
        cacheable: true,
    },
    ToolSpec {
        name: contracts::TOOL_TRABAJADORES_LISTAR,
        description: "List registered workers.",
        input_schema: contracts::trabajadores_listar_schema,
        cacheable: true,
    },
    ToolSpec {
        name: contracts::TOOL_TRABAJADORES_OBTENER,
        description: "Get a worker by DNI/CE/passport number.",
        input_schema: contracts::trabajadores_obtener_schema,
        cacheable: true,
    },
    ToolSpec {
        name: contracts::TOOL_EXAMENES_LISTAR,
        description: "List occupational medical exams, newest first.",
        input_schema: contracts::examenes_listar_schema,
        cacheable: true,
    },
    ToolSpec {
        name: contracts::TOOL_EXAMENES_ANALIZAR,
        description: "Analyze an EMO PDF and extract the clinical summary and the structured exam table.",
        input_schema: contracts::examenes_analizar_schema,
        cacheable: false,
    },
    ToolSpec {
        name: contracts::TOOL_EXAMENES_REGISTRAR,
        description: "Register an exam from an extracted table and record it in the analysis history.",
        input_schema: contracts::examenes_registrar_schema,
        cacheable: false,
    },
    ToolSpec {
        name: contracts::TOOL_EMPRESAS_LISTAR,
        description: "List the companies linked to a user.",
        input_schema: contracts::empresas_listar_schema,
        cacheable: true,
    },
    ToolSpec {
        name: contracts::TOOL_EMPRESAS_OBTENER,
        description: "Get a company by id.",
        input_schema: contracts::empresas_obtener_schema,
        cacheable: true,
    },
    ToolSpec {
        name: contracts::TOOL_EMPRESAS_BUSCAR,
        description: "Search companies by name or RUC.",
        input_schema: contracts::empresas_buscar_schema,
        cacheable: true,
    },
    ToolSpec {
        name: contracts::TOOL_EMPRESAS_CREAR,
        description: "Create a company and optionally link it to a user.",
        input_schema: contracts::empresas_crear_schema,
        cacheable: false,
    },
    ToolSpec {
        name: contracts::TOOL_STORAGE_LISTAR,
        description: "List files in a storage bucket.",
        input_schema: contracts::storage_listar_schema,
        cacheable: true,
    },
    ToolSpec {
        name: contracts::TOOL_STORAGE_DESCARGAR,
        description: "Download a file from storage as base64.",
        input_schema: contracts::storage_descargar_schema,
        cacheable: false,
    },
];

pub fn tool_definitions() -> Vec<Value> {
    TOOLS.iter().map(ToolSpec::descriptor).collect()
}
