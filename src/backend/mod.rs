//! Relational and object-storage backend contract.
//!
//! Tools only talk to the backend through [`Backend`], so the hosted platform
//! can be swapped for an in-memory double in tests.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub mod supabase;

pub use supabase::SupabaseBackend;

/// Error reported by the backend, with the vendor's code and hint preserved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    pub code: Option<String>,
    pub status: Option<u16>,
    pub message: String,
    pub hint: Option<String>,
    pub details: Option<String>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            status: None,
            message: message.into(),
            hint: None,
            details: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Row filter understood by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq { column: String, value: String },
    In { column: String, values: Vec<String> },
    /// Case-insensitive substring match on any of the columns.
    AnyILike { columns: Vec<String>, term: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Read query against a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl SelectQuery {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: None,
        }
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.push(Filter::Eq {
            column: column.into(),
            value: value.into(),
        });
        self
    }

    pub fn eq_opt(self, column: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.eq(column, value),
            None => self,
        }
    }

    pub fn in_list(mut self, column: impl Into<String>, values: Vec<String>) -> Self {
        self.filters.push(Filter::In {
            column: column.into(),
            values,
        });
        self
    }

    pub fn search(mut self, columns: &[&str], term: impl Into<String>) -> Self {
        self.filters.push(Filter::AnyILike {
            columns: columns.iter().map(|column| column.to_string()).collect(),
            term: term.into(),
        });
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending: false,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Entry returned when listing a storage bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageObject {
    pub name: String,
    pub id: Option<String>,
    pub updated_at: Option<String>,
    pub metadata: Value,
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Value>, BackendError>;

    /// Inserts one row and returns the stored representation.
    async fn insert(&self, table: &str, row: Value) -> Result<Value, BackendError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), BackendError>;

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<StorageObject>, BackendError>;

    async fn download_object(&self, bucket: &str, path: &str) -> Result<Vec<u8>, BackendError>;

    /// Runs `query` and requires exactly one row back.
    async fn select_one(&self, query: &SelectQuery) -> Result<Value, BackendError> {
        let mut rows = self.select(query).await?;
        if rows.len() != 1 {
            return Err(BackendError::new(format!(
                "JSON object requested, multiple (or no) rows returned ({} rows)",
                rows.len()
            ))
            .with_code("PGRST116")
            .with_status(406));
        }
        Ok(rows.remove(0))
    }
}
