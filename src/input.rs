use crate::document::{MAX_DOCUMENT_MB, encode_base64};
use crate::mcp::errors;
use std::fs;
use std::path::Path;

const MAX_DOCUMENT_BYTES: u64 = (MAX_DOCUMENT_MB as u64) * 1024 * 1024;

/// A document handed to the CLI, normalized to the base64 form the pipeline takes.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub base64: String,
    pub source: String,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct InputError {
    pub kind: &'static str,
    pub message: String,
}

impl InputError {
    fn new(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(errors::VALIDATION_ERROR, message)
    }

    fn too_large(message: impl Into<String>) -> Self {
        Self::new(errors::INVALID_DOCUMENT, message)
    }
}

/// Exactly one of `path` and `base64` must be given. Base64 text is passed on
/// as-is; decoding and signature checks belong to the validator.
pub fn load_document(
    path: Option<&Path>,
    base64: Option<&str>,
) -> Result<DocumentInput, InputError> {
    match (path, base64) {
        (None, None) => Err(InputError::invalid_input(
            "either path or base64 is required",
        )),
        (Some(_), Some(_)) => Err(InputError::invalid_input(
            "path and base64 cannot both be set",
        )),
        (Some(path), None) => load_path(path),
        (None, Some(encoded)) => {
            let encoded = encoded.trim();
            if encoded.is_empty() {
                return Err(InputError::invalid_input("base64 must not be empty"));
            }
            Ok(DocumentInput {
                base64: encoded.to_string(),
                source: "base64".to_string(),
            })
        }
    }
}

fn load_path(path: &Path) -> Result<DocumentInput, InputError> {
    let metadata = fs::metadata(path)
        .map_err(|_| InputError::invalid_input("path must exist and be a file"))?;
    if !metadata.is_file() {
        return Err(InputError::invalid_input("path must be a file"));
    }
    let len = metadata.len();
    if len > MAX_DOCUMENT_BYTES {
        return Err(InputError::too_large(format!(
            "document exceeds limit: {len} bytes (max {MAX_DOCUMENT_BYTES})"
        )));
    }
    let bytes =
        fs::read(path).map_err(|_| InputError::invalid_input("failed to read path contents"))?;
    Ok(DocumentInput {
        base64: encode_base64(&bytes),
        source: format!("path:{}", path.display()),
    })
}
