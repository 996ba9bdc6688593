//! Core domain types shared by the collector, engine, and pipeline crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RepoWikiError;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one index or generate run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// QueryMode
// ---------------------------------------------------------------------------

/// Retrieval strategy the knowledge engine uses to answer a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    /// Entity-centric retrieval around specific symbols.
    Local,
    /// Relationship-centric retrieval across the whole graph.
    Global,
    /// Local and global combined.
    Hybrid,
    /// Graph retrieval mixed with plain vector search.
    Mix,
    /// Plain vector search, no graph.
    Naive,
}

impl QueryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Global => "global",
            Self::Hybrid => "hybrid",
            Self::Mix => "mix",
            Self::Naive => "naive",
        }
    }
}

impl fmt::Display for QueryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryMode {
    type Err = RepoWikiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "global" => Ok(Self::Global),
            "hybrid" => Ok(Self::Hybrid),
            "mix" => Ok(Self::Mix),
            "naive" => Ok(Self::Naive),
            other => Err(RepoWikiError::validation(format!(
                "unknown query mode {other:?}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Documents and queries
// ---------------------------------------------------------------------------

/// A repository file prepared for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedDocument {
    /// Path relative to the repository root, `/`-separated. Doubles as the
    /// document's source identity in the engine.
    pub relative_path: String,
    /// Header line plus the decoded file content.
    pub body: String,
    /// Size of the file on disk.
    pub byte_length: usize,
}

impl LoadedDocument {
    /// Build a document, prefixing `content` with the `# File:` header.
    pub fn new(relative_path: impl Into<String>, content: &str, byte_length: usize) -> Self {
        let relative_path = relative_path.into();
        let body = format!("# File: {relative_path}\n\n{content}");
        Self {
            relative_path,
            body,
            byte_length,
        }
    }
}

/// One retrieval query against the knowledge engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryRequest {
    pub prompt: String,
    pub mode: QueryMode,
    /// Result fan-in size (`top_k`).
    pub breadth: u32,
}

/// Parallelism hints passed along with an ingestion batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestOptions {
    pub max_parallel_insert: usize,
    pub llm_model_max_async: usize,
    pub embedding_func_max_async: usize,
}

impl From<&crate::config::Settings> for IngestOptions {
    fn from(settings: &crate::config::Settings) -> Self {
        Self {
            max_parallel_insert: settings.max_parallel_insert,
            llm_model_max_async: settings.llm_model_max_async,
            embedding_func_max_async: settings.embedding_func_max_async,
        }
    }
}
