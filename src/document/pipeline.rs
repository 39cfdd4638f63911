use super::extraction::{ExtractionFailure, ExtractionJob, ExtractionOrchestrator};
use super::parser::{self, ParseError, Table};
use super::preprocess::{PreprocessOutcome, Preprocessor};
use super::validator::{self, DocumentKind, DocumentValidation};
use super::{encode_base64, prompt};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub pdf_base64: String,
    pub use_thinking: bool,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("invalid document: {}", .0.error.as_deref().unwrap_or("unknown reason"))]
    InvalidDocument(DocumentValidation),

    #[error(transparent)]
    Extraction(#[from] ExtractionFailure),

    #[error("failed to parse extraction reply: {source}")]
    Parse { source: ParseError, raw: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisMetadata {
    pub pdf_type: DocumentKind,
    pub pdf_size_mb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    pub is_scanned: bool,
    pub used_ocr: bool,
    pub preprocessing_applied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRecord {
    #[serde(rename = "resumen_clinico")]
    pub clinical_summary: String,
    #[serde(rename = "csv")]
    pub tabular_block: Option<String>,
    #[serde(rename = "csv_parseado")]
    pub parsed_table: Option<Table>,
    #[serde(rename = "respuesta_completa")]
    pub raw_text: String,
    pub metadata: AnalysisMetadata,
}

/// validate -> preprocess -> extract -> parse, strictly in that order.
pub struct DocumentAnalyzer {
    orchestrator: ExtractionOrchestrator,
    preprocessor: Arc<dyn Preprocessor>,
    prompt: String,
}

impl DocumentAnalyzer {
    pub fn new(orchestrator: ExtractionOrchestrator, preprocessor: Arc<dyn Preprocessor>) -> Self {
        Self {
            orchestrator,
            preprocessor,
            prompt: prompt::extraction_prompt(),
        }
    }

    pub async fn analyze(
        &self,
        request: &AnalysisRequest,
    ) -> Result<ExtractedRecord, AnalysisError> {
        let inspection = validator::inspect(&request.pdf_base64);
        let validation = inspection.validation;
        let Some(original) = inspection.bytes.filter(|_| validation.is_valid) else {
            tracing::info!(error = ?validation.error, "document rejected");
            return Err(AnalysisError::InvalidDocument(validation));
        };
        tracing::info!(
            pdf_type = validation.kind.as_str(),
            size_mb = validation.size_in_mb,
            page_count = ?validation.page_count,
            "document validated"
        );

        let mut payload = Cow::Borrowed(request.pdf_base64.as_str());
        let mut bytes = original;
        let mut preprocessing_applied = false;
        if validation.needs_preprocessing() {
            match self.preprocessor.enhance(&bytes, &validation).await {
                Ok(PreprocessOutcome::Enhanced(enhanced)) => {
                    tracing::info!(
                        before = bytes.len(),
                        after = enhanced.len(),
                        "document enhanced"
                    );
                    payload = Cow::Owned(encode_base64(&enhanced));
                    bytes = enhanced;
                    preprocessing_applied = true;
                }
                Ok(PreprocessOutcome::Unchanged) => {
                    tracing::debug!("preprocessor left document unchanged");
                }
                Ok(PreprocessOutcome::NotImplemented) => {
                    tracing::info!("preprocessing requested but not available");
                }
                Err(err) => {
                    tracing::warn!(error = %err, "preprocessing failed, using original document");
                }
            }
        }

        let extraction = self
            .orchestrator
            .run(ExtractionJob {
                prompt: &self.prompt,
                payload: &payload,
                bytes: &bytes,
                kind: validation.kind,
                use_thinking: request.use_thinking,
                max_attempts: request.max_attempts,
            })
            .await?;

        let parsed = parser::parse(&extraction.text).map_err(|source| AnalysisError::Parse {
            source,
            raw: extraction.text.clone(),
        })?;

        Ok(ExtractedRecord {
            clinical_summary: parsed.clinical_summary,
            tabular_block: parsed.tabular_block,
            parsed_table: parsed.parsed_table,
            raw_text: extraction.text,
            metadata: AnalysisMetadata {
                pdf_type: validation.kind,
                pdf_size_mb: (validation.size_in_mb * 100.0).round() / 100.0,
                page_count: validation.page_count,
                is_scanned: validation.is_scanned,
                used_ocr: extraction.used_ocr,
                preprocessing_applied,
            },
        })
    }
}
