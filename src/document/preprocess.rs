use super::validator::DocumentValidation;
use async_trait::async_trait;

/// What a preprocessor did with the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreprocessOutcome {
    /// Replacement bytes used for every subsequent extraction attempt.
    Enhanced(Vec<u8>),
    /// Ran, but found nothing worth changing.
    Unchanged,
    /// No enhancement capability in this build.
    NotImplemented,
}

#[derive(Debug, thiserror::Error)]
#[error("preprocessing failed: {0}")]
pub struct PreprocessError(pub String);

/// Image enhancement (contrast, denoise, resize) for scanned documents.
#[async_trait]
pub trait Preprocessor: Send + Sync {
    async fn enhance(
        &self,
        bytes: &[u8],
        validation: &DocumentValidation,
    ) -> Result<PreprocessOutcome, PreprocessError>;
}

pub struct UnavailablePreprocessor;

#[async_trait]
impl Preprocessor for UnavailablePreprocessor {
    async fn enhance(
        &self,
        _bytes: &[u8],
        _validation: &DocumentValidation,
    ) -> Result<PreprocessOutcome, PreprocessError> {
        Ok(PreprocessOutcome::NotImplemented)
    }
}
