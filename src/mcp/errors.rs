use crate::backend::BackendError;
use crate::document::extraction::ExtractionFailure;
use crate::document::parser::ParseError;
use crate::document::pipeline::AnalysisError;
use crate::document::validator::DocumentValidation;
use serde_json::{Value, json};

pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
pub const BACKEND_ERROR: &str = "BACKEND_ERROR";
pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
pub const INVALID_DOCUMENT: &str = "INVALID_DOCUMENT";
pub const ANALYSIS_FAILED: &str = "ANALYSIS_FAILED";
pub const OCR_FALLBACK_FAILED: &str = "OCR_FALLBACK_FAILED";
pub const PARSE_ERROR: &str = "PARSE_ERROR";
pub const UNKNOWN_TOOL: &str = "UNKNOWN_TOOL";
pub const UNEXPECTED_ERROR: &str = "UNEXPECTED_ERROR";

pub const JSONRPC_PARSE_ERROR: i64 = -32700;
pub const JSONRPC_INVALID_REQUEST: i64 = -32600;
pub const JSONRPC_METHOD_NOT_FOUND: i64 = -32601;
pub const JSONRPC_INVALID_PARAMS: i64 = -32602;
pub const JSONRPC_INTERNAL_ERROR: i64 = -32603;

/// Every way a tool invocation can fail after it has been routed to a handler.
///
/// Failures never leave the invocation as `Err`: they are rendered into an
/// error envelope with [`ToolFailure::into_envelope`] and returned inside a
/// successful JSON-RPC result.
#[derive(Debug, thiserror::Error)]
pub enum ToolFailure {
    #[error("validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("{context}: {source}")]
    Backend {
        context: String,
        source: BackendError,
    },

    #[error("{context}: {source}")]
    Storage {
        context: String,
        source: BackendError,
    },

    #[error("invalid document: {}", .0.error.as_deref().unwrap_or("unknown reason"))]
    InvalidDocument(DocumentValidation),

    #[error("{0}")]
    Extraction(ExtractionFailure),

    #[error("failed to parse extraction reply: {source}")]
    Parse { source: ParseError, raw: String },

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ToolFailure {
    pub fn backend(context: impl Into<String>, source: BackendError) -> Self {
        Self::Backend {
            context: context.into(),
            source,
        }
    }

    pub fn storage(context: impl Into<String>, source: BackendError) -> Self {
        Self::Storage {
            context: context.into(),
            source,
        }
    }

    pub fn code(&self) -> String {
        match self {
            Self::Validation(_) => VALIDATION_ERROR.to_string(),
            Self::Backend { source, .. } => source
                .code
                .clone()
                .unwrap_or_else(|| BACKEND_ERROR.to_string()),
            Self::Storage { source, .. } => source
                .code
                .clone()
                .unwrap_or_else(|| STORAGE_ERROR.to_string()),
            Self::InvalidDocument(_) => INVALID_DOCUMENT.to_string(),
            Self::Extraction(failure) => match failure {
                ExtractionFailure::PayloadTooLarge { .. } => INVALID_DOCUMENT.to_string(),
                ExtractionFailure::Exhausted { .. } => ANALYSIS_FAILED.to_string(),
                ExtractionFailure::Combined { .. } => OCR_FALLBACK_FAILED.to_string(),
            },
            Self::Parse { .. } => PARSE_ERROR.to_string(),
            Self::Unexpected(_) => UNEXPECTED_ERROR.to_string(),
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            Self::Validation(errors) => Some(json!({ "errors": errors })),
            Self::Backend { source, .. } | Self::Storage { source, .. } => Some(json!({
                "backend_code": source.code,
                "backend_status": source.status,
                "backend_hint": source.hint,
                "backend_details": source.details,
            })),
            Self::InvalidDocument(validation) => Some(json!({ "validation": validation })),
            Self::Extraction(failure) => Some(failure.details()),
            Self::Parse { source, raw } => Some(json!({
                "parse_error": source.to_string(),
                "raw_response": raw,
            })),
            Self::Unexpected(_) => None,
        }
    }

    pub fn into_envelope(self) -> Value {
        let code = self.code();
        let details = self.details();
        error_result(&code, self.to_string(), details)
    }
}

impl From<AnalysisError> for ToolFailure {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::InvalidDocument(validation) => Self::InvalidDocument(validation),
            AnalysisError::Extraction(failure) => Self::Extraction(failure),
            AnalysisError::Parse { source, raw } => Self::Parse { source, raw },
        }
    }
}

pub fn error_result(code: &str, message: impl Into<String>, details: Option<Value>) -> Value {
    let message = message.into();
    let mut envelope = json!({
        "content": [{"type": "text", "text": format!("Error: {message}")}],
        "isError": true,
        "error_code": code,
    });

    if let Some(details) = details
        && let Some(obj) = envelope.as_object_mut()
    {
        obj.insert("error_details".to_string(), details);
    }

    envelope
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_has_uniform_shape() {
        let envelope = ToolFailure::Validation(vec!["\"bucket\" is a required property".into()])
            .into_envelope();
        assert_eq!(envelope["isError"], json!(true));
        assert_eq!(envelope["error_code"], json!(VALIDATION_ERROR));
        assert_eq!(envelope["content"][0]["type"], json!("text"));
        assert!(
            envelope["content"][0]["text"]
                .as_str()
                .expect("text")
                .contains("bucket")
        );
        assert!(envelope["error_details"]["errors"].is_array());
    }

    #[test]
    fn backend_code_passes_through() {
        let failure = ToolFailure::backend(
            "failed to list cases",
            BackendError {
                code: Some("42P01".into()),
                status: Some(404),
                message: "relation \"casos\" does not exist".into(),
                hint: Some("check the table name".into()),
                details: None,
            },
        );
        assert_eq!(failure.code(), "42P01");
        let envelope = failure.into_envelope();
        assert_eq!(envelope["error_details"]["backend_hint"], json!("check the table name"));
        assert!(
            envelope["content"][0]["text"]
                .as_str()
                .expect("text")
                .starts_with("Error: failed to list cases:")
        );
    }

    #[test]
    fn backend_without_code_uses_generic_code() {
        let storage = ToolFailure::storage("failed to download file", BackendError::new("boom"));
        assert_eq!(storage.code(), STORAGE_ERROR);
        let backend = ToolFailure::backend("failed to list cases", BackendError::new("boom"));
        assert_eq!(backend.code(), BACKEND_ERROR);
    }

    #[test]
    fn details_are_omitted_when_absent() {
        let envelope = ToolFailure::Unexpected("worker vanished".into()).into_envelope();
        assert!(envelope.get("error_details").is_none());
        assert_eq!(envelope["error_code"], json!(UNEXPECTED_ERROR));
    }
}
