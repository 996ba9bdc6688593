//! In-memory knowledge engine for tests.
//!
//! Records every call and can be told to fail specific operations, so the
//! pipeline's fallback and partial-failure paths can be exercised without a
//! server.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use repowiki_shared::{IngestOptions, LoadedDocument, QueryRequest, RepoWikiError, Result};

use crate::{EngineHealth, KnowledgeEngine, PipelineStatus};

#[derive(Default)]
struct State {
    documents: BTreeMap<String, String>,
    ingest_calls: Vec<usize>,
    queries: Vec<QueryRequest>,
    busy_polls: usize,
}

/// Scriptable [`KnowledgeEngine`] that keeps everything in memory.
#[derive(Default)]
pub struct MemoryEngine {
    state: Mutex<State>,
    fail_batches: bool,
    failing_documents: Vec<String>,
    failing_queries: Vec<String>,
    responses: HashMap<String, String>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any ingest call carrying more than one document.
    pub fn fail_batch_ingest(mut self) -> Self {
        self.fail_batches = true;
        self
    }

    /// Reject any ingest call that includes `relative_path`.
    pub fn fail_document(mut self, relative_path: impl Into<String>) -> Self {
        self.failing_documents.push(relative_path.into());
        self
    }

    /// Fail queries whose prompt contains `marker`.
    pub fn fail_query_containing(mut self, marker: impl Into<String>) -> Self {
        self.failing_queries.push(marker.into());
        self
    }

    /// Answer queries whose prompt contains `marker` with `text`.
    pub fn respond_with(mut self, marker: impl Into<String>, text: impl Into<String>) -> Self {
        self.responses.insert(marker.into(), text.into());
        self
    }

    /// Report a busy pipeline for the next `polls` status checks.
    pub fn busy_for(self, polls: usize) -> Self {
        self.lock().busy_polls = polls;
        self
    }

    /// Stored documents keyed by relative path.
    pub fn documents(&self) -> BTreeMap<String, String> {
        self.lock().documents.clone()
    }

    /// Size of every ingest call, in call order.
    pub fn ingest_calls(&self) -> Vec<usize> {
        self.lock().ingest_calls.clone()
    }

    pub fn queries(&self) -> Vec<QueryRequest> {
        self.lock().queries.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KnowledgeEngine for MemoryEngine {
    async fn ingest(&self, documents: &[LoadedDocument], _options: &IngestOptions) -> Result<()> {
        let mut state = self.lock();
        state.ingest_calls.push(documents.len());

        if self.fail_batches && documents.len() > 1 {
            return Err(RepoWikiError::Engine("batch insert rejected".into()));
        }
        if let Some(doc) = documents
            .iter()
            .find(|d| self.failing_documents.contains(&d.relative_path))
        {
            return Err(RepoWikiError::Engine(format!(
                "cannot ingest {}",
                doc.relative_path
            )));
        }

        for doc in documents {
            state
                .documents
                .insert(doc.relative_path.clone(), doc.body.clone());
        }
        Ok(())
    }

    async fn query(&self, request: &QueryRequest) -> Result<String> {
        self.lock().queries.push(request.clone());

        if let Some(marker) = self
            .failing_queries
            .iter()
            .find(|m| request.prompt.contains(m.as_str()))
        {
            return Err(RepoWikiError::Engine(format!("query failed on {marker:?}")));
        }
        if let Some(text) = self
            .responses
            .iter()
            .find(|(marker, _)| request.prompt.contains(marker.as_str()))
            .map(|(_, text)| text.clone())
        {
            return Ok(text);
        }

        let first_line = request.prompt.lines().next().unwrap_or_default();
        Ok(format!("{first_line}\n\nAnswer ({} mode).", request.mode))
    }

    async fn pipeline_status(&self) -> Result<PipelineStatus> {
        let mut state = self.lock();
        if state.busy_polls > 0 {
            state.busy_polls -= 1;
            return Ok(PipelineStatus {
                busy: true,
                latest_message: Some(format!("{} document(s) stored", state.documents.len())),
            });
        }
        Ok(PipelineStatus::default())
    }

    async fn health(&self) -> Result<EngineHealth> {
        Ok(EngineHealth {
            status: "healthy".into(),
            ..Default::default()
        })
    }
}
