//! OCR engine contract used by the extraction fallback path.

use async_trait::async_trait;
use serde::Serialize;

pub const DEFAULT_LANGUAGE: &str = "spa";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrOutput {
    pub text: String,
    pub confidence: f32,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OcrError {
    #[error("OCR engine is not available in this build")]
    NotImplemented,

    #[error("OCR produced no text")]
    EmptyText,

    #[error("OCR failed: {0}")]
    Engine(String),
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognizes text in a PDF or image payload.
    async fn recognize(&self, bytes: &[u8], language: &str) -> Result<OcrOutput, OcrError>;
}

/// Engine used when no OCR backend is wired in.
pub struct UnavailableOcr;

#[async_trait]
impl OcrEngine for UnavailableOcr {
    async fn recognize(&self, _bytes: &[u8], language: &str) -> Result<OcrOutput, OcrError> {
        tracing::warn!(language, "OCR requested but no engine is configured");
        Err(OcrError::NotImplemented)
    }
}
