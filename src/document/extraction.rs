//! AI-first extraction with bounded retries and an OCR fallback for scanned
//! documents.
//!
//! A run moves through [`ExtractionState`]:
//!
//! ```text
//! Attempting(n) -> Succeeded | Backoff(n+1) | ExhaustedPrimary
//! Backoff(n)    -> Attempting(n)
//! ExhaustedPrimary -> OcrFallback (scanned) | ExhaustedAll
//! OcrFallback   -> Succeeded | ExhaustedAll
//! ```
//!
//! [`ExtractionRun`] owns the transitions and the attempt history; the
//! orchestrator only performs the I/O each state asks for.

use super::model::{ExternalError, GenerationRequest, GenerativeModel, InlineData};
use super::ocr::{DEFAULT_LANGUAGE, OcrEngine, OcrError};
use super::prompt;
use super::validator::DocumentKind;
use super::{LARGE_DOCUMENT_MB, MAX_DOCUMENT_MB, detect_mime_type, estimated_size_mb};
use rand::Rng;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_jitter: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Delay before the attempt following `failed_attempt` (1-based).
    pub fn backoff(&self, failed_attempt: u32, jitter: Duration) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(31);
        let base = self.base_delay.saturating_mul(1u32 << exponent);
        base.saturating_add(jitter).min(self.max_delay)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

/// One failed primary attempt, kept only for error reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub error_message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionState {
    Attempting { attempt: u32 },
    Backoff { next_attempt: u32, delay: Duration },
    Succeeded { text: String, used_ocr: bool },
    ExhaustedPrimary,
    OcrFallback,
    ExhaustedAll,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExtractionFailure {
    #[error("document too large: {size_mb:.2}MB (limit {MAX_DOCUMENT_MB}MB)")]
    PayloadTooLarge { size_mb: f64 },

    #[error("analysis failed after {} attempts; last error: {last}", attempts.len())]
    Exhausted {
        attempts: Vec<AttemptRecord>,
        last: ExternalError,
    },

    #[error("analysis failed ({primary}) and OCR fallback failed ({ocr})")]
    Combined {
        attempts: Vec<AttemptRecord>,
        primary: ExternalError,
        ocr: String,
    },
}

impl ExtractionFailure {
    pub fn details(&self) -> Value {
        match self {
            ExtractionFailure::PayloadTooLarge { size_mb } => json!({
                "size_mb": size_mb,
                "limit_mb": MAX_DOCUMENT_MB,
            }),
            ExtractionFailure::Exhausted { attempts, last } => json!({
                "last_error_code": last.code,
                "last_status": last.status,
                "last_error_message": last.message,
                "attempts": attempts,
            }),
            ExtractionFailure::Combined {
                attempts,
                primary,
                ocr,
            } => json!({
                "primary_error": primary,
                "ocr_error": ocr,
                "attempts": attempts,
            }),
        }
    }
}

/// Transition logic and history for one extraction run.
#[derive(Debug)]
pub struct ExtractionRun {
    policy: RetryPolicy,
    kind: DocumentKind,
    attempts: Vec<AttemptRecord>,
    last_error: Option<ExternalError>,
    ocr_error: Option<String>,
}

impl ExtractionRun {
    pub fn new(policy: RetryPolicy, kind: DocumentKind) -> Self {
        Self {
            policy,
            kind,
            attempts: Vec::new(),
            last_error: None,
            ocr_error: None,
        }
    }

    pub fn start(&self) -> ExtractionState {
        ExtractionState::Attempting { attempt: 1 }
    }

    pub fn after_attempt(
        &mut self,
        attempt: u32,
        outcome: Result<String, ExternalError>,
    ) -> ExtractionState {
        let error = match outcome {
            Ok(text) => {
                return ExtractionState::Succeeded {
                    text,
                    used_ocr: false,
                };
            }
            Err(error) => error,
        };

        let retryable = error.is_retryable();
        tracing::warn!(
            attempt,
            max_attempts = self.policy.max_attempts,
            code = %error.code,
            status = ?error.status,
            retryable,
            error = %error.message,
            "extraction attempt failed"
        );
        self.attempts.push(AttemptRecord {
            attempt,
            error_code: error.code.clone(),
            status: error.status,
            error_message: error.message.clone(),
            retryable,
        });
        self.last_error = Some(error);

        if attempt >= self.policy.max_attempts {
            return ExtractionState::ExhaustedPrimary;
        }
        ExtractionState::Backoff {
            next_attempt: attempt + 1,
            delay: self.policy.backoff(attempt, self.policy.jitter()),
        }
    }

    pub fn after_primary_exhausted(&self) -> ExtractionState {
        if self.kind == DocumentKind::Scanned {
            ExtractionState::OcrFallback
        } else {
            ExtractionState::ExhaustedAll
        }
    }

    pub fn after_ocr(&mut self, outcome: Result<String, String>) -> ExtractionState {
        match outcome {
            Ok(text) => ExtractionState::Succeeded {
                text,
                used_ocr: true,
            },
            Err(error) => {
                tracing::warn!(error = %error, "OCR fallback failed");
                self.ocr_error = Some(error);
                ExtractionState::ExhaustedAll
            }
        }
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn into_failure(self) -> ExtractionFailure {
        let last = self
            .last_error
            .unwrap_or_else(|| ExternalError::new("UNKNOWN", "no attempt was made"));
        match self.ocr_error {
            Some(ocr) => ExtractionFailure::Combined {
                attempts: self.attempts,
                primary: last,
                ocr,
            },
            None => ExtractionFailure::Exhausted {
                attempts: self.attempts,
                last,
            },
        }
    }
}

/// Input for one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionJob<'a> {
    pub prompt: &'a str,
    /// Base64 payload sent inline to the model.
    pub payload: &'a str,
    /// Decoded bytes handed to the OCR engine on fallback.
    pub bytes: &'a [u8],
    pub kind: DocumentKind,
    pub use_thinking: bool,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub used_ocr: bool,
}

pub struct ExtractionOrchestrator {
    model: Arc<dyn GenerativeModel>,
    ocr: Arc<dyn OcrEngine>,
    policy: RetryPolicy,
}

impl ExtractionOrchestrator {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        ocr: Arc<dyn OcrEngine>,
        policy: RetryPolicy,
    ) -> Self {
        Self { model, ocr, policy }
    }

    pub async fn run(&self, job: ExtractionJob<'_>) -> Result<Extraction, ExtractionFailure> {
        let size_mb = estimated_size_mb(job.payload);
        if size_mb > MAX_DOCUMENT_MB {
            return Err(ExtractionFailure::PayloadTooLarge { size_mb });
        }
        if size_mb > LARGE_DOCUMENT_MB {
            tracing::warn!(size_mb, "large document, analysis may take longer");
        }

        let policy = match job.max_attempts {
            Some(max) => self.policy.with_max_attempts(max),
            None => self.policy,
        };
        let request = GenerationRequest {
            prompt: job.prompt.to_string(),
            inline_data: Some(InlineData {
                mime_type: detect_mime_type(job.payload).to_string(),
                data: job.payload.to_string(),
            }),
            use_thinking: job.use_thinking,
        };

        let mut run = ExtractionRun::new(policy, job.kind);
        let mut state = run.start();
        loop {
            state = match state {
                ExtractionState::Attempting { attempt } => {
                    let started = Instant::now();
                    let outcome = self.model.generate(&request).await;
                    if outcome.is_ok() {
                        tracing::info!(
                            attempt,
                            max_attempts = policy.max_attempts,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "extraction completed"
                        );
                    }
                    run.after_attempt(attempt, outcome)
                }
                ExtractionState::Backoff {
                    next_attempt,
                    delay,
                } => {
                    tracing::info!(
                        next_attempt,
                        delay_ms = delay.as_millis() as u64,
                        "backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    ExtractionState::Attempting {
                        attempt: next_attempt,
                    }
                }
                ExtractionState::ExhaustedPrimary => run.after_primary_exhausted(),
                ExtractionState::OcrFallback => {
                    tracing::info!("primary extraction exhausted, trying OCR fallback");
                    let outcome = self.ocr_path(job.prompt, job.bytes).await;
                    run.after_ocr(outcome)
                }
                ExtractionState::Succeeded { text, used_ocr } => {
                    return Ok(Extraction { text, used_ocr });
                }
                ExtractionState::ExhaustedAll => return Err(run.into_failure()),
            };
        }
    }

    /// One OCR pass, then one model call to structure the recognized text.
    async fn ocr_path(&self, base_prompt: &str, bytes: &[u8]) -> Result<String, String> {
        let output = self
            .ocr
            .recognize(bytes, DEFAULT_LANGUAGE)
            .await
            .map_err(|err| err.to_string())?;
        if output.text.trim().is_empty() {
            return Err(OcrError::EmptyText.to_string());
        }
        tracing::info!(
            confidence = output.confidence,
            language = %output.language,
            chars = output.text.len(),
            "OCR recognized text"
        );
        let request = GenerationRequest::text(prompt::with_ocr_text(base_prompt, &output.text));
        self.model
            .generate(&request)
            .await
            .map_err(|err| format!("structuring OCR text failed: {err}"))
    }
}
