//! PostgREST + Storage REST implementation of [`Backend`].

use super::{Backend, BackendError, Filter, SelectQuery, StorageObject};
use crate::config::{BackendConfig, ConfigError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde_json::{Value, json};

const STORAGE_LIST_LIMIT: u64 = 100;

#[derive(Clone)]
pub struct SupabaseBackend {
    client: Client,
    base: Url,
    api_key: String,
}

impl SupabaseBackend {
    /// Builds the client once at startup; a bad URL fails here rather than on
    /// the first tool call.
    pub fn new(config: &BackendConfig) -> Result<Self, ConfigError> {
        let base = Url::parse(&config.url).map_err(|err| ConfigError::Invalid {
            key: "SUPABASE_URL",
            message: err.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                key: "SUPABASE_URL",
                message: "must be an http(s) base url".to_string(),
            });
        }
        let client = Client::builder()
            .build()
            .map_err(|err| ConfigError::Client(err.to_string()))?;
        Ok(Self {
            client,
            base,
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, BackendError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::new("backend url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }
}

#[async_trait]
impl Backend for SupabaseBackend {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Value>, BackendError> {
        let url = self.endpoint(["rest", "v1", query.table.as_str()])?;
        let request = self
            .authorized(self.client.get(url))
            .query(&query_pairs(query));
        tracing::debug!(table = %query.table, "backend select");
        let response = send(request).await?;
        match response.json::<Value>().await {
            Ok(Value::Array(rows)) => Ok(rows),
            Ok(other) => Ok(vec![other]),
            Err(err) => Err(BackendError::new(format!("invalid backend response: {err}"))),
        }
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        let url = self.endpoint(["rest", "v1", table])?;
        let request = self
            .authorized(self.client.post(url))
            .header("Prefer", "return=representation")
            .json(&json!([row]));
        tracing::debug!(table, "backend insert");
        let response = send(request).await?;
        let inserted = response
            .json::<Value>()
            .await
            .map_err(|err| BackendError::new(format!("invalid backend response: {err}")))?;
        match inserted {
            Value::Array(mut rows) if !rows.is_empty() => Ok(rows.remove(0)),
            Value::Array(_) => Err(BackendError::new("insert returned no rows")),
            other => Ok(other),
        }
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), BackendError> {
        let url = self.endpoint(["rest", "v1", table])?;
        let pairs: Vec<(String, String)> = filters.iter().map(filter_pair).collect();
        let request = self.authorized(self.client.delete(url)).query(&pairs);
        tracing::debug!(table, "backend delete");
        send(request).await.map(|_| ())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<StorageObject>, BackendError> {
        let url = self.endpoint(["storage", "v1", "object", "list", bucket])?;
        let request = self.authorized(self.client.post(url)).json(&json!({
            "prefix": prefix,
            "limit": STORAGE_LIST_LIMIT,
            "offset": 0,
            "sortBy": {"column": "name", "order": "asc"}
        }));
        let response = send(request).await?;
        let entries = response
            .json::<Vec<Value>>()
            .await
            .map_err(|err| BackendError::new(format!("invalid storage response: {err}")))?;
        Ok(entries.into_iter().map(storage_object).collect())
    }

    async fn download_object(&self, bucket: &str, path: &str) -> Result<Vec<u8>, BackendError> {
        let segments = ["storage", "v1", "object", bucket]
            .into_iter()
            .chain(path.split('/').filter(|segment| !segment.is_empty()));
        let url = self.endpoint(segments)?;
        let response = send(self.authorized(self.client.get(url))).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| BackendError::new(format!("failed to read object body: {err}")))?;
        Ok(bytes.to_vec())
    }
}

async fn send(request: RequestBuilder) -> Result<Response, BackendError> {
    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(error_from_body(status.as_u16(), &body))
}

fn transport_error(err: reqwest::Error) -> BackendError {
    let code = if err.is_timeout() {
        "ETIMEDOUT"
    } else if err.is_connect() {
        "ECONNREFUSED"
    } else {
        "FETCH_ERROR"
    };
    BackendError::new(err.to_string()).with_code(code)
}

/// PostgREST replies `{code, message, details, hint}`; Storage replies
/// `{statusCode, error, message}`.
fn error_from_body(status: u16, body: &str) -> BackendError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let text = |key: &str| parsed.get(key).and_then(Value::as_str).map(str::to_string);
    let message = text("message")
        .or_else(|| text("error"))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("backend responded with status {status}")
            } else {
                body.trim().to_string()
            }
        });
    BackendError {
        code: text("code").or_else(|| text("error")),
        status: Some(status),
        message,
        hint: text("hint"),
        details: text("details"),
    }
}

fn storage_object(entry: Value) -> StorageObject {
    let text = |key: &str| entry.get(key).and_then(Value::as_str).map(str::to_string);
    StorageObject {
        name: text("name").unwrap_or_default(),
        id: text("id"),
        updated_at: text("updated_at"),
        metadata: entry.get("metadata").cloned().unwrap_or(Value::Null),
    }
}

fn query_pairs(query: &SelectQuery) -> Vec<(String, String)> {
    let mut pairs = vec![("select".to_string(), query.columns.clone())];
    pairs.extend(query.filters.iter().map(filter_pair));
    if let Some(order) = &query.order {
        let direction = if order.ascending { "asc" } else { "desc" };
        pairs.push(("order".to_string(), format!("{}.{direction}", order.column)));
    }
    if let Some(limit) = query.limit {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(offset) = query.offset {
        pairs.push(("offset".to_string(), offset.to_string()));
    }
    pairs
}

fn filter_pair(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq { column, value } => (column.clone(), format!("eq.{value}")),
        Filter::In { column, values } => {
            let quoted: Vec<String> = values.iter().map(|value| quote(value)).collect();
            (column.clone(), format!("in.({})", quoted.join(",")))
        }
        Filter::AnyILike { columns, term } => {
            let pattern = quote(&format!("*{term}*"));
            let clauses: Vec<String> = columns
                .iter()
                .map(|column| format!("{column}.ilike.{pattern}"))
                .collect();
            ("or".to_string(), format!("({})", clauses.join(",")))
        }
    }
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
