#![allow(dead_code)]

use async_trait::async_trait;
use emo_mcp::backend::{Backend, BackendError, Filter, SelectQuery, StorageObject};
use emo_mcp::cache::{CacheConfig, ToolCache};
use emo_mcp::document::model::GenerationRequest;
use emo_mcp::document::{
    ExternalError, GenerativeModel, OcrEngine, OcrError, OcrOutput, RetryPolicy,
    UnavailablePreprocessor, encode_base64,
};
use emo_mcp::rpc::Dispatcher;
use emo_mcp::{Collaborators, assemble};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

pub const TEXT_REPLY: &str = "RESUMEN: Trabajador apto sin restricciones.\n\
PARTE 2:\n\
Fecha_EMO;Centro_Medico;DNI;Nombre\n\
15/03/2024;Clinica Norte;12345678;Juan Perez\n";

pub fn text_pdf() -> String {
    encode_base64(b"%PDF-1.4\n1 0 obj << /Type /Font /Subtype /TrueType >> endobj\n/Count 2\n%%EOF")
}

pub fn scanned_pdf() -> String {
    encode_base64(b"%PDF-1.4\n1 0 obj << /Type /XObject /Subtype /Image /Filter /DCTDecode >> endobj\n%%EOF")
}

/// In-memory backend that records every call.
#[derive(Default)]
pub struct MockBackend {
    pub tables: Mutex<HashMap<String, Vec<Value>>>,
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub selects: Mutex<Vec<SelectQuery>>,
    pub inserts: Mutex<Vec<(String, Value)>>,
    pub deletes: Mutex<Vec<(String, Vec<Filter>)>>,
    pub failing_inserts: Mutex<HashMap<String, BackendError>>,
    pub select_error: Mutex<Option<BackendError>>,
}

impl MockBackend {
    pub fn with_rows(table: &str, rows: Vec<Value>) -> Arc<Self> {
        let backend = Self::default();
        backend.tables.lock().insert(table.to_string(), rows);
        Arc::new(backend)
    }

    pub fn fail_inserts_into(&self, table: &str, error: BackendError) {
        self.failing_inserts.lock().insert(table.to_string(), error);
    }

    pub fn select_count(&self) -> usize {
        self.selects.lock().len()
    }

    pub fn total_calls(&self) -> usize {
        self.select_count() + self.inserts.lock().len() + self.deletes.lock().len()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Value>, BackendError> {
        self.selects.lock().push(query.clone());
        if let Some(err) = self.select_error.lock().clone() {
            return Err(err);
        }
        let rows = self
            .tables
            .lock()
            .get(&query.table)
            .cloned()
            .unwrap_or_default();
        let filtered = rows
            .into_iter()
            .filter(|row| {
                query.filters.iter().all(|filter| match filter {
                    Filter::Eq { column, value } => {
                        row.get(column).and_then(Value::as_str) == Some(value.as_str())
                    }
                    Filter::In { column, values } => row
                        .get(column)
                        .and_then(Value::as_str)
                        .is_some_and(|found| values.iter().any(|value| value == found)),
                    Filter::AnyILike { .. } => true,
                })
            })
            .collect();
        Ok(filtered)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError> {
        self.inserts
            .lock()
            .push((table.to_string(), row.clone()));
        if let Some(err) = self.failing_inserts.lock().get(table) {
            return Err(err.clone());
        }
        let mut stored = row;
        if let Some(obj) = stored.as_object_mut() {
            obj.entry("id").or_insert_with(|| json!(format!("{table}-1")));
        }
        Ok(stored)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), BackendError> {
        self.deletes
            .lock()
            .push((table.to_string(), filters.to_vec()));
        Ok(())
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<StorageObject>, BackendError> {
        let objects = self.objects.lock();
        Ok(objects
            .keys()
            .filter_map(|key| key.strip_prefix(&format!("{bucket}/")))
            .filter(|name| name.starts_with(prefix))
            .map(|name| StorageObject {
                name: name.to_string(),
                id: None,
                updated_at: None,
                metadata: Value::Null,
            })
            .collect())
    }

    async fn download_object(&self, bucket: &str, path: &str) -> Result<Vec<u8>, BackendError> {
        self.objects
            .lock()
            .get(&format!("{bucket}/{path}"))
            .cloned()
            .ok_or_else(|| BackendError::new("Object not found").with_status(404))
    }
}

/// Backend whose reads panic mid-call.
pub struct ExplodingBackend;

#[async_trait]
impl Backend for ExplodingBackend {
    async fn select(&self, _query: &SelectQuery) -> Result<Vec<Value>, BackendError> {
        panic!("backend exploded");
    }

    async fn insert(&self, _table: &str, _row: Value) -> Result<Value, BackendError> {
        panic!("backend exploded");
    }

    async fn delete(&self, _table: &str, _filters: &[Filter]) -> Result<(), BackendError> {
        panic!("backend exploded");
    }

    async fn list_objects(
        &self,
        _bucket: &str,
        _prefix: &str,
    ) -> Result<Vec<StorageObject>, BackendError> {
        panic!("backend exploded");
    }

    async fn download_object(&self, _bucket: &str, _path: &str) -> Result<Vec<u8>, BackendError> {
        panic!("backend exploded");
    }
}

/// Backend whose writes take a minute to land. `committed` counts the ones that did.
#[derive(Default)]
pub struct StalledBackend {
    pub committed: AtomicUsize,
}

impl StalledBackend {
    async fn stall(&self) {
        tokio::time::sleep(Duration::from_secs(60)).await;
        self.committed.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Backend for StalledBackend {
    async fn select(&self, _query: &SelectQuery) -> Result<Vec<Value>, BackendError> {
        Ok(Vec::new())
    }

    async fn insert(&self, _table: &str, row: Value) -> Result<Value, BackendError> {
        self.stall().await;
        Ok(row)
    }

    async fn delete(&self, _table: &str, _filters: &[Filter]) -> Result<(), BackendError> {
        Ok(())
    }

    async fn list_objects(
        &self,
        _bucket: &str,
        _prefix: &str,
    ) -> Result<Vec<StorageObject>, BackendError> {
        Ok(Vec::new())
    }

    async fn download_object(&self, _bucket: &str, _path: &str) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::new("Object not found").with_status(404))
    }
}

/// Model double that replays a script and records when each call happened.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ExternalError>>>,
    calls: Mutex<Vec<(Instant, bool)>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, ExternalError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().iter().map(|(at, _)| *at).collect()
    }

    /// Whether each call carried the document inline.
    pub fn inline_flags(&self) -> Vec<bool> {
        self.calls.lock().iter().map(|(_, inline)| *inline).collect()
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ExternalError> {
        self.calls
            .lock()
            .push((Instant::now(), request.inline_data.is_some()));
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ExternalError::http(503, "script exhausted")))
    }
}

pub struct FixedOcr {
    result: Result<OcrOutput, OcrError>,
    calls: Mutex<u32>,
}

impl FixedOcr {
    pub fn new(result: Result<OcrOutput, OcrError>) -> Arc<Self> {
        Arc::new(Self {
            result,
            calls: Mutex::new(0),
        })
    }

    pub fn recognized(text: &str) -> Arc<Self> {
        Self::new(Ok(OcrOutput {
            text: text.to_string(),
            confidence: 0.91,
            language: "spa".to_string(),
        }))
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

#[async_trait]
impl OcrEngine for FixedOcr {
    async fn recognize(&self, _bytes: &[u8], _language: &str) -> Result<OcrOutput, OcrError> {
        *self.calls.lock() += 1;
        self.result.clone()
    }
}

pub fn dispatcher(
    backend: Arc<dyn Backend>,
    model: Arc<ScriptedModel>,
    ocr: Arc<FixedOcr>,
) -> Dispatcher {
    assemble(
        Collaborators {
            backend,
            model,
            ocr,
            preprocessor: Arc::new(UnavailablePreprocessor),
        },
        RetryPolicy::default(),
        Arc::new(ToolCache::new(CacheConfig::default())),
    )
    .expect("dispatcher")
}

pub fn backend_only(backend: Arc<dyn Backend>) -> Dispatcher {
    dispatcher(
        backend,
        ScriptedModel::new(Vec::new()),
        FixedOcr::new(Err(OcrError::NotImplemented)),
    )
}

pub async fn call_tool(dispatcher: &Dispatcher, name: &str, arguments: Value) -> Value {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    });
    let response = dispatcher.handle(request).await.expect("response");
    let value = serde_json::to_value(response).expect("serialize");
    value
        .get("result")
        .cloned()
        .unwrap_or_else(|| panic!("expected result, got {value}"))
}
