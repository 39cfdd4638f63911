//! Generative model contract and the Gemini `generateContent` client.

use crate::config::{ConfigError, GeminiConfig};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};

const TEMPERATURE: f64 = 0.2;
const MAX_OUTPUT_TOKENS: u32 = 8192;
const THINKING_BUDGET: u32 = 1024;

const RETRYABLE_CODES: [&str; 4] = ["ECONNRESET", "ETIMEDOUT", "ENOTFOUND", "ECONNREFUSED"];
const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Every failure of an external call, normalized right after the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{message} (code: {code})")]
pub struct ExternalError {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
}

impl ExternalError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            status: None,
            message: message.into(),
        }
    }

    /// HTTP failure; the status doubles as the code unless the vendor sent one.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            code: status.to_string(),
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_retryable(&self) -> bool {
        if RETRYABLE_CODES.contains(&self.code.as_str()) {
            return true;
        }
        match self.status {
            Some(status) => RETRYABLE_STATUSES.contains(&status) || (500..600).contains(&status),
            None => self.code.starts_with('5') && self.code.parse::<u16>().is_ok(),
        }
    }
}

impl From<reqwest::Error> for ExternalError {
    fn from(err: reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            "ETIMEDOUT"
        } else if err.is_connect() {
            "ECONNREFUSED"
        } else if err.is_decode() {
            "INVALID_RESPONSE"
        } else {
            "FETCH_ERROR"
        };
        let mut normalized = ExternalError::new(code, err.to_string());
        normalized.status = err.status().map(|status| status.as_u16());
        normalized
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineData {
    pub mime_type: String,
    /// Base64 payload.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub inline_data: Option<InlineData>,
    pub use_thinking: bool,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            inline_data: None,
            use_thinking: false,
        }
    }
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ExternalError>;
}

pub struct GeminiClient {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .build()
            .map_err(|err| ConfigError::Client(err.to_string()))?;
        let endpoint = format!(
            "{}/v1beta/models/{}:generateContent",
            config.base_url.trim_end_matches('/'),
            config.model
        );
        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ExternalError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_body(status.as_u16(), &body));
        }

        let body: Value = response.json().await?;
        response_text(&body)
    }
}

fn request_body(request: &GenerationRequest) -> Value {
    let mut parts = Vec::with_capacity(2);
    if let Some(inline) = &request.inline_data {
        parts.push(json!({
            "inlineData": {"mimeType": inline.mime_type, "data": inline.data}
        }));
    }
    parts.push(json!({"text": request.prompt}));

    let mut generation_config = json!({
        "temperature": TEMPERATURE,
        "maxOutputTokens": MAX_OUTPUT_TOKENS,
    });
    if request.use_thinking
        && let Some(obj) = generation_config.as_object_mut()
    {
        obj.insert(
            "thinkingConfig".to_string(),
            json!({"thinkingBudget": THINKING_BUDGET}),
        );
    }

    json!({
        "contents": [{"role": "user", "parts": parts}],
        "generationConfig": generation_config,
    })
}

/// Gemini errors look like `{"error": {"code": 503, "message": ..., "status": "UNAVAILABLE"}}`.
fn error_from_body(status: u16, body: &str) -> ExternalError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let error = parsed.get("error");
    let message = error
        .and_then(|error| error.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("model responded with status {status}"));
    match error
        .and_then(|error| error.get("status"))
        .and_then(Value::as_str)
    {
        Some(code) => ExternalError::new(code, message).with_status(status),
        None => ExternalError::http(status, message),
    }
}

fn response_text(body: &Value) -> Result<String, ExternalError> {
    let parts = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array);
    let text: String = parts
        .into_iter()
        .flatten()
        .filter(|part| !part.get("thought").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.trim().is_empty() {
        let reason = body
            .pointer("/candidates/0/finishReason")
            .or_else(|| body.pointer("/promptFeedback/blockReason"))
            .and_then(Value::as_str)
            .unwrap_or("no candidates");
        return Err(ExternalError::new(
            "EMPTY_RESPONSE",
            format!("model returned no text ({reason})"),
        ));
    }
    Ok(text)
}
