//! Extraction prompt and the column layout the parser expects back.

/// Marker separating the clinical summary from the delimited table.
pub const TABLE_MARKER: &str = "PARTE 2:";
pub const DELIMITER: char = ';';
/// A line is the table header when it carries all of these.
pub const REQUIRED_HEADERS: [&str; 2] = ["Fecha_EMO", "Centro_Medico"];
/// Sentinel for values the document does not show.
pub const NOT_AVAILABLE: &str = "ND";

pub const CSV_HEADERS: &[&str] = &[
    "Fecha_EMO",
    "Centro_Medico",
    "Tipo_Examen",
    "DNI",
    "Nombre",
    "Edad",
    "Sexo",
    "Puesto",
    "Empresa",
    "Aptitud_Final",
    "Vencimiento",
    "Restr_Lentes",
    "Restr_Altura_1.8m",
    "Restr_Elec",
    "Recomendaciones_Grales",
    "Ant_Personales",
    "Habitos_Nocivos",
    "Ant_Familiares",
    "PA_Sistolica",
    "PA_Diastolica",
    "FC",
    "SatO2",
    "Peso",
    "Talla",
    "IMC",
    "Cintura",
    "Cadera",
    "Aptitud_Espalda_Score",
    "Hallazgos_Musculo",
    "Aptitud_Gran_Altura",
    "Aptitud_Altura_Estructural",
    "EKG_Ritmo",
    "Vis_Lejos_OD_SC",
    "Vis_Lejos_OI_SC",
    "Vis_Lejos_OD_CC",
    "Vis_Lejos_OI_CC",
    "Vision_Colores",
    "Vision_Profundidad",
    "Dx_Oftalmo",
    "Dx_Audio",
    "Espiro_Conclusion",
    "FVC_Valor",
    "FEV1_Valor",
    "Rx_Torax_OIT",
    "Aptitud_Psico",
    "Odonto_Estado",
    "Hb",
    "Hto",
    "Leucocitos",
    "Plaquetas",
    "Glucosa",
    "Col_Total",
    "HDL",
    "LDL",
    "Trigliceridos",
    "Ex_Orina",
    "Toxicologico",
    "Grupo_Sangre",
];

pub fn extraction_prompt() -> String {
    format!(
        "ROL: Auditor médico de salud ocupacional.\n\
         OBJETIVO: Extraer toda la información clínica del examen médico ocupacional adjunto.\n\n\
         REGLAS:\n\
         - No infieras valores. Si un dato no aparece, es ilegible o la marca es ambigua, usa \"{na}\".\n\
         - Para las restricciones (lentes, altura > 1.8 m, trabajos eléctricos) reporta SI o NO según la \
         columna donde está físicamente la marca.\n\
         - Identifica el tipo de examen: Pre-ocupacional, Anual o Retiro.\n\n\
         FORMATO DE SALIDA:\n\
         PARTE 1: RESUMEN CLÍNICO\n\
         Viñetas con datos generales y aptitud, hallazgos críticos e interconsultas pendientes.\n\n\
         {marker} BLOQUE CSV\n\
         Una línea de encabezados y una línea de valores, separadas por '{delimiter}', \
         con exactamente estos encabezados:\n{headers}\n",
        na = NOT_AVAILABLE,
        marker = TABLE_MARKER,
        delimiter = DELIMITER,
        headers = CSV_HEADERS.join(&DELIMITER.to_string()),
    )
}

/// Prompt for structuring OCR output; the text may contain recognition errors.
pub fn with_ocr_text(base_prompt: &str, ocr_text: &str) -> String {
    format!(
        "{base_prompt}\n\n\
         TEXTO EXTRAÍDO POR OCR (puede tener errores de reconocimiento):\n{ocr_text}\n\n\
         Estructura esta información según el formato solicitado."
    )
}
