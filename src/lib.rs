//! MCP tool server for occupational medical exam (EMO) records: a JSON-RPC
//! tool registry over the records backend plus the document pipeline that
//! turns exam PDFs into structured data.

pub mod backend;
pub mod cache;
pub mod config;
pub mod document;
pub mod input;
pub mod mcp;
pub mod rpc;
pub mod server;
pub mod tools;

use backend::Backend;
use backend::supabase::SupabaseBackend;
use cache::ToolCache;
use config::{Config, ConfigError};
use document::{
    DocumentAnalyzer, ExtractionOrchestrator, GeminiClient, GenerativeModel, OcrEngine,
    Preprocessor, RetryPolicy, UnavailableOcr, UnavailablePreprocessor,
};
use rpc::Dispatcher;
use std::sync::Arc;
use tools::{RegistryError, ToolContext, ToolRouter};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Collaborators behind the tool registry.
pub struct Collaborators {
    pub backend: Arc<dyn Backend>,
    pub model: Arc<dyn GenerativeModel>,
    pub ocr: Arc<dyn OcrEngine>,
    pub preprocessor: Arc<dyn Preprocessor>,
}

/// Builds every handle from configuration. Fails before serving anything.
pub fn build_dispatcher(config: &Config) -> Result<Dispatcher, StartupError> {
    let collaborators = Collaborators {
        backend: Arc::new(SupabaseBackend::new(&config.backend)?),
        model: Arc::new(GeminiClient::new(&config.gemini)?),
        ocr: Arc::new(UnavailableOcr),
        preprocessor: Arc::new(UnavailablePreprocessor),
    };
    let policy = RetryPolicy::default().with_max_attempts(config.extraction.max_attempts);
    let cache = Arc::new(ToolCache::new(config.cache.clone()));
    Ok(assemble(collaborators, policy, cache)?)
}

pub fn assemble(
    collaborators: Collaborators,
    policy: RetryPolicy,
    cache: Arc<ToolCache>,
) -> Result<Dispatcher, RegistryError> {
    let orchestrator =
        ExtractionOrchestrator::new(collaborators.model, collaborators.ocr, policy);
    let analyzer = DocumentAnalyzer::new(orchestrator, collaborators.preprocessor);
    let ctx = ToolContext {
        backend: collaborators.backend,
        analyzer: Arc::new(analyzer),
    };
    Ok(Dispatcher::new(ToolRouter::new(ctx, cache)?))
}
