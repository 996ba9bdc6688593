//! Knowledge engine contract and its implementations.
//!
//! The pipeline only talks to [`KnowledgeEngine`]. [`LightRagClient`] drives a
//! LightRAG-compatible HTTP server; [`fakes::MemoryEngine`] stands in for it
//! in tests. Model adapters live in [`models`].

pub mod fakes;
pub mod lightrag;
pub mod models;

use async_trait::async_trait;

use repowiki_shared::{IngestOptions, LoadedDocument, QueryRequest, Result};

pub use lightrag::{LightRagClient, require_model};
pub use models::{CompletionModel, EmbeddingModel, ModelBindings, OpenAiModel};

/// Operations the pipeline needs from a knowledge engine.
///
/// Implementations are shared across concurrent tasks and must tolerate
/// concurrent `query` calls. Enforcing concurrency limits is the engine's job.
#[async_trait]
pub trait KnowledgeEngine: Send + Sync {
    /// Ingest a batch of documents. Re-ingesting a document with the same
    /// identity must not duplicate it. Fails only on systemic errors.
    async fn ingest(&self, documents: &[LoadedDocument], options: &IngestOptions) -> Result<()>;

    /// Answer one retrieval query.
    async fn query(&self, request: &QueryRequest) -> Result<String>;

    /// Whether background ingestion work is still running.
    async fn pipeline_status(&self) -> Result<PipelineStatus> {
        Ok(PipelineStatus::default())
    }

    /// Reachability and server-side configuration.
    async fn health(&self) -> Result<EngineHealth>;
}

/// Background processing state reported by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStatus {
    pub busy: bool,
    pub latest_message: Option<String>,
}

/// Server health plus whatever configuration it chose to report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineHealth {
    pub status: String,
    pub llm_model: Option<String>,
    pub embedding_model: Option<String>,
    pub max_parallel_insert: Option<usize>,
    pub workspace: Option<String>,
}
