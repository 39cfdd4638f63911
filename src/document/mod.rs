//! EMO document intelligence: validation, preprocessing, extraction through
//! the generative model (with OCR fallback) and parsing of the reply.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

pub mod extraction;
pub mod model;
pub mod ocr;
pub mod parser;
pub mod pipeline;
pub mod preprocess;
pub mod prompt;
pub mod validator;

pub use extraction::{ExtractionFailure, ExtractionOrchestrator, RetryPolicy};
pub use model::{ExternalError, GeminiClient, GenerativeModel};
pub use ocr::{OcrEngine, OcrError, OcrOutput, UnavailableOcr};
pub use parser::{ParseError, ParsedExtraction};
pub use pipeline::{AnalysisError, AnalysisRequest, DocumentAnalyzer, ExtractedRecord};
pub use preprocess::{Preprocessor, PreprocessOutcome, UnavailablePreprocessor};
pub use validator::{DocumentKind, DocumentValidation};

/// Largest decoded payload accepted by the model.
pub const MAX_DOCUMENT_MB: f64 = 20.0;
/// Payloads above this size are logged and, when ambiguous, preprocessed.
pub const LARGE_DOCUMENT_MB: f64 = 5.0;

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoded size estimate from the base64 length, in MB, without decoding.
pub fn estimated_size_mb(encoded: &str) -> f64 {
    (encoded.len() as f64 * 3.0 / 4.0) / (1024.0 * 1024.0)
}

/// Decodes standard base64, ignoring ASCII whitespace and missing padding.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if encoded.bytes().any(|byte| byte.is_ascii_whitespace()) {
        let compact: String = encoded
            .chars()
            .filter(|ch| !ch.is_ascii_whitespace())
            .collect();
        return LENIENT.decode(compact.as_bytes());
    }
    LENIENT.decode(encoded.as_bytes())
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// MIME type guessed from the first base64 characters of the payload.
pub fn detect_mime_type(encoded: &str) -> &'static str {
    if encoded.starts_with("/9j/") {
        "image/jpeg"
    } else if encoded.starts_with("iVBORw") {
        "image/png"
    } else {
        "application/pdf"
    }
}
