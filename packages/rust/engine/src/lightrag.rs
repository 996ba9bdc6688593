//! HTTP client for a LightRAG-compatible knowledge engine server.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

use repowiki_shared::{
    IngestOptions, LoadedDocument, QueryRequest, RepoWikiError, Result, Settings,
};

use crate::models::{ModelBindings, build_client, truncate};
use crate::{EngineHealth, KnowledgeEngine, PipelineStatus};

/// Header selecting the server-side workspace.
const WORKSPACE_HEADER: &str = "LIGHTRAG-WORKSPACE";

/// Header carrying the server credential.
const API_KEY_HEADER: &str = "X-API-Key";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct InsertTextsRequest<'a> {
    texts: Vec<&'a str>,
    file_sources: Vec<&'a str>,
}

#[derive(Deserialize)]
struct InsertResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    track_id: Option<String>,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    mode: &'a str,
    top_k: u32,
    only_need_context: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    response: Option<String>,
}

#[derive(Deserialize)]
struct PipelineStatusResponse {
    #[serde(default)]
    busy: bool,
    #[serde(default)]
    latest_message: Option<String>,
}

#[derive(Deserialize, Default)]
struct HealthResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    configuration: HealthConfiguration,
}

#[derive(Deserialize, Default)]
struct HealthConfiguration {
    llm_model: Option<String>,
    embedding_model: Option<String>,
    max_parallel_insert: Option<usize>,
    workspace: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Knowledge engine backed by a LightRAG HTTP server.
pub struct LightRagClient {
    client: Client,
    base_url: Url,
    workspace: String,
    api_key: Option<String>,
    bindings: Option<ModelBindings>,
}

impl LightRagClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = build_client(settings.request_timeout)
            .map_err(|e| RepoWikiError::Engine(e.to_string()))?;
        Ok(Self {
            client,
            base_url: settings.engine_url.clone(),
            workspace: settings.workspace.clone(),
            api_key: settings.engine_api_key.clone(),
            bindings: None,
        })
    }

    /// Attach the completion and embedding functions this run expects the
    /// engine to use.
    pub fn with_bindings(mut self, bindings: ModelBindings) -> Self {
        self.bindings = Some(bindings);
        self
    }

    pub fn bindings(&self) -> Option<&ModelBindings> {
        self.bindings.as_ref()
    }

    /// Check the server is up and log any drift between its configuration
    /// and ours. Only an unreachable server is an error.
    #[instrument(skip_all, fields(url = %self.base_url, workspace = %self.workspace))]
    pub async fn verify(&self, options: &IngestOptions) -> Result<EngineHealth> {
        let health = self.health().await?;
        info!(status = %health.status, "knowledge engine reachable");

        for warning in configuration_drift(&health, self.bindings.as_ref(), options) {
            warn!("{warning}");
        }
        Ok(health)
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| RepoWikiError::Engine(format!("bad endpoint {path}: {e}")))?;

        let mut builder = self
            .client
            .request(method, url)
            .header(WORKSPACE_HEADER, &self.workspace);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        Ok(builder)
    }

    async fn send<R: for<'de> Deserialize<'de>>(&self, builder: RequestBuilder) -> Result<R> {
        let response = builder
            .send()
            .await
            .map_err(|e| RepoWikiError::Engine(e.to_string()))?;

        let url = response.url().clone();
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RepoWikiError::Engine(format!(
                "{url}: HTTP {status}: {}",
                truncate(&text, 500)
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RepoWikiError::Engine(format!("{url}: invalid response: {e}")))
    }
}

#[async_trait]
impl KnowledgeEngine for LightRagClient {
    #[instrument(skip_all, fields(documents = documents.len()))]
    async fn ingest(&self, documents: &[LoadedDocument], options: &IngestOptions) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        debug!(
            max_parallel_insert = options.max_parallel_insert,
            llm_model_max_async = options.llm_model_max_async,
            embedding_func_max_async = options.embedding_func_max_async,
            "submitting documents"
        );

        let body = InsertTextsRequest {
            texts: documents.iter().map(|d| d.body.as_str()).collect(),
            file_sources: documents.iter().map(|d| d.relative_path.as_str()).collect(),
        };
        let builder = self.request(Method::POST, "documents/texts")?.json(&body);
        let response: InsertResponse = self.send(builder).await?;

        match response.status.as_str() {
            "success" | "partial_success" => {
                info!(track_id = ?response.track_id, "documents accepted");
                Ok(())
            }
            "duplicated" => {
                info!(message = %response.message, "documents already present");
                Ok(())
            }
            other => Err(RepoWikiError::Engine(format!(
                "ingest rejected ({other}): {}",
                response.message
            ))),
        }
    }

    #[instrument(skip_all, fields(mode = %request.mode, top_k = request.breadth))]
    async fn query(&self, request: &QueryRequest) -> Result<String> {
        let body = QueryBody {
            query: &request.prompt,
            mode: request.mode.as_str(),
            top_k: request.breadth,
            only_need_context: false,
        };
        let builder = self.request(Method::POST, "query")?.json(&body);
        let response: QueryResponse = self.send(builder).await?;

        response
            .response
            .ok_or_else(|| RepoWikiError::Engine("query returned no response".into()))
    }

    async fn pipeline_status(&self) -> Result<PipelineStatus> {
        let builder = self.request(Method::GET, "documents/pipeline_status")?;
        let response: PipelineStatusResponse = self.send(builder).await?;
        Ok(PipelineStatus {
            busy: response.busy,
            latest_message: response.latest_message.filter(|m| !m.is_empty()),
        })
    }

    async fn health(&self) -> Result<EngineHealth> {
        let builder = self.request(Method::GET, "health")?;
        let response: HealthResponse = self.send(builder).await?;
        Ok(EngineHealth {
            status: response.status,
            llm_model: response.configuration.llm_model,
            embedding_model: response.configuration.embedding_model,
            max_parallel_insert: response.configuration.max_parallel_insert,
            workspace: response.configuration.workspace,
        })
    }
}

/// Fail when the engine reports a completion model other than `expected`.
/// An engine that does not report its model is accepted.
pub fn require_model(health: &EngineHealth, expected: &str) -> Result<()> {
    match &health.llm_model {
        Some(served) if served != expected => Err(RepoWikiError::config(format!(
            "engine serves completion model {served:?}, but {expected:?} was requested"
        ))),
        _ => Ok(()),
    }
}

/// Human-readable differences between the server's reported configuration
/// and what this run was configured with.
pub fn configuration_drift(
    health: &EngineHealth,
    bindings: Option<&ModelBindings>,
    options: &IngestOptions,
) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(b) = bindings {
        if let Some(server) = &health.llm_model {
            if server != b.completion.model_id() {
                out.push(format!(
                    "engine uses LLM {server:?}, configured {:?}",
                    b.completion.model_id()
                ));
            }
        }
        if let Some(server) = &health.embedding_model {
            if server != b.embedding.model_id() {
                out.push(format!(
                    "engine uses embedding model {server:?}, configured {:?}",
                    b.embedding.model_id()
                ));
            }
        }
    }

    if let Some(server) = health.max_parallel_insert {
        if server != options.max_parallel_insert {
            out.push(format!(
                "engine inserts {server} documents in parallel, configured {}",
                options.max_parallel_insert
            ));
        }
    }

    out
}
