//! Cheap, local gates run before any external call.
//!
//! Classification scans raw bytes for font/text-object markers and embedded
//! image markers. It is a hint for choosing an extraction strategy, not a
//! statement about the document: encrypted or compressed object streams can
//! hide either kind of marker.

use super::{LARGE_DOCUMENT_MB, MAX_DOCUMENT_MB, decode_base64, estimated_size_mb};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

const SIGNATURE: &[u8; 4] = b"%PDF";
const SCAN_WINDOW: usize = 10_000;

static TEXT_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/Type\s*/Font|/Subtype\s*/Type1|/Subtype\s*/TrueType").expect("valid regex")
});
static XOBJECT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Type\s*/XObject").expect("valid regex"));
static IMAGE_MARKERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/Subtype\s*/Image|/Filter\s*/DCTDecode").expect("valid regex")
});
static PAGE_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/Count\s+(\d+)").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Text,
    Scanned,
    Mixed,
    Unknown,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Text => "text",
            DocumentKind::Scanned => "scanned",
            DocumentKind::Mixed => "mixed",
            DocumentKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentValidation {
    pub is_valid: bool,
    #[serde(rename = "type")]
    pub kind: DocumentKind,
    pub has_text: bool,
    pub is_scanned: bool,
    #[serde(rename = "sizeInMB")]
    pub size_in_mb: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentValidation {
    fn rejected(size_in_mb: f64, error: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            kind: DocumentKind::Unknown,
            has_text: false,
            is_scanned: false,
            size_in_mb,
            page_count: None,
            error: Some(error.into()),
        }
    }

    /// Scanned documents, and ambiguous ones large enough to suggest images,
    /// go through the preprocessor before extraction.
    pub fn needs_preprocessing(&self) -> bool {
        self.is_valid
            && (self.is_scanned
                || (self.kind == DocumentKind::Unknown && self.size_in_mb > LARGE_DOCUMENT_MB))
    }
}

/// Validation result plus the decoded bytes when decoding got that far.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub validation: DocumentValidation,
    pub bytes: Option<Vec<u8>>,
}

pub fn validate(encoded: &str) -> DocumentValidation {
    inspect(encoded).validation
}

pub fn inspect(encoded: &str) -> Inspection {
    if encoded.trim().is_empty() {
        return rejected(0.0, "document data is empty");
    }

    let size_in_mb = estimated_size_mb(encoded);
    if size_in_mb > MAX_DOCUMENT_MB {
        return rejected(
            size_in_mb,
            format!("document too large: {size_in_mb:.2}MB (limit {MAX_DOCUMENT_MB}MB)"),
        );
    }

    let bytes = match decode_base64(encoded) {
        Ok(bytes) => bytes,
        Err(err) => return rejected(size_in_mb, format!("document is not valid base64: {err}")),
    };
    if !bytes.starts_with(SIGNATURE) {
        return rejected(size_in_mb, "document is not a valid PDF (bad signature)");
    }

    let window = &bytes[..bytes.len().min(SCAN_WINDOW)];
    let content: String = window.iter().map(|&byte| char::from(byte)).collect();

    let has_text = TEXT_MARKERS.is_match(&content)
        || (content.contains("BT") && content.contains("ET"));
    let has_images = XOBJECT_MARKER.is_match(&content) && IMAGE_MARKERS.is_match(&content);
    let page_count = PAGE_COUNT
        .captures(&content)
        .and_then(|captures| captures.get(1))
        .and_then(|count| count.as_str().parse().ok());

    let kind = match (has_text, has_images) {
        (true, true) => DocumentKind::Mixed,
        (true, false) => DocumentKind::Text,
        (false, true) => DocumentKind::Scanned,
        (false, false) => DocumentKind::Unknown,
    };

    Inspection {
        validation: DocumentValidation {
            is_valid: true,
            kind,
            has_text,
            is_scanned: kind == DocumentKind::Scanned,
            size_in_mb,
            page_count,
            error: None,
        },
        bytes: Some(bytes),
    }
}

fn rejected(size_in_mb: f64, error: impl Into<String>) -> Inspection {
    Inspection {
        validation: DocumentValidation::rejected(size_in_mb, error),
        bytes: None,
    }
}
