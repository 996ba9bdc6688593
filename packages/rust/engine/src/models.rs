//! Completion and embedding adapters.
//!
//! Thin wrappers over an OpenAI-compatible HTTP API, bound to one model
//! identifier and credential each and capped by a semaphore.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};
use url::Url;

use repowiki_shared::{EMBEDDING_DIM, EMBEDDING_MAX_TOKENS, RepoWikiError, Result, Settings};

/// User-Agent string for model requests.
const USER_AGENT: &str = concat!("repowiki/", env!("CARGO_PKG_VERSION"));

/// Sampling temperature used for completions.
const TEMPERATURE: f32 = 0.7;

/// Maps a prompt to generated text.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    fn model_id(&self) -> &str;
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String>;
}

/// Maps texts to embedding vectors, one per input, in input order.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    fn model_id(&self) -> &str;
    fn dimension(&self) -> usize;
    /// Longest input, in tokens, the model accepts.
    fn max_tokens(&self) -> usize;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// The completion and embedding functions the engine is configured with.
#[derive(Clone)]
pub struct ModelBindings {
    pub completion: Arc<dyn CompletionModel>,
    pub embedding: Arc<dyn EmbeddingModel>,
}

impl ModelBindings {
    /// Build OpenAI-compatible adapters from validated settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = build_client(settings.request_timeout)?;
        let completion = OpenAiModel::new(
            client.clone(),
            settings.llm_base_url.clone(),
            &settings.llm_model,
            &settings.api_key,
            settings.llm_model_max_async,
        );
        let embedding = OpenAiModel::new(
            client,
            settings.llm_base_url.clone(),
            &settings.embedding_model,
            &settings.api_key,
            settings.embedding_func_max_async,
        );
        Ok(Self {
            completion: Arc::new(completion),
            embedding: Arc::new(embedding),
        })
    }
}

impl std::fmt::Debug for ModelBindings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBindings")
            .field("completion", &self.completion.model_id())
            .field("embedding", &self.embedding.model_id())
            .finish()
    }
}

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| RepoWikiError::Model(format!("failed to build HTTP client: {e}")))
}

// ---------------------------------------------------------------------------
// OpenAI-compatible adapter
// ---------------------------------------------------------------------------

/// One model behind an OpenAI-compatible endpoint.
pub struct OpenAiModel {
    client: Client,
    base_url: Url,
    model: String,
    api_key: String,
    permits: Arc<Semaphore>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiModel {
    pub fn new(
        client: Client,
        base_url: Url,
        model: &str,
        api_key: &str,
        max_concurrent: usize,
    ) -> Self {
        Self {
            client,
            base_url,
            model: model.to_string(),
            api_key: api_key.to_string(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Join `path` onto the base URL, keeping any base path (`/v1`).
    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path)
            .map_err(|e| RepoWikiError::Model(format!("bad endpoint {path}: {e}")))
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let url = self.endpoint(path)?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RepoWikiError::Model("model adapter closed".into()))?;

        let response = self
            .client
            .post(url.clone())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| RepoWikiError::Model(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RepoWikiError::Model(format!(
                "{url}: HTTP {status}: {}",
                truncate(&text, 300)
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RepoWikiError::Model(format!("{url}: invalid response: {e}")))
    }
}

#[async_trait]
impl CompletionModel for OpenAiModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: TEMPERATURE,
        };
        let response: ChatResponse = self.post("chat/completions", &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RepoWikiError::Model("completion returned no choices".into()))
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    fn max_tokens(&self) -> usize {
        EMBEDDING_MAX_TOKENS
    }

    #[instrument(skip_all, fields(model = %self.model, texts = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };
        let mut response: EmbeddingResponse = self.post("embeddings", &request).await?;

        if response.data.len() != texts.len() {
            return Err(RepoWikiError::Model(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }
        response.data.sort_by_key(|d| d.index);

        if let Some(first) = response.data.first() {
            if first.embedding.len() != EMBEDDING_DIM {
                warn!(
                    expected = EMBEDDING_DIM,
                    actual = first.embedding.len(),
                    "embedding dimension differs from engine configuration"
                );
            }
        }
        debug!(count = response.data.len(), "embeddings received");

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

pub(crate) fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn model(server: &MockServer, name: &str) -> OpenAiModel {
        let base = Url::parse(&format!("{}/v1", server.uri())).unwrap();
        let client = build_client(Duration::from_secs(5)).unwrap();
        OpenAiModel::new(client, base, name, "sk-test", 2)
    }

    #[tokio::test]
    async fn completion_sends_model_and_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-test"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "pong"}}]
            })))
            .mount(&server)
            .await;

        let m = model(&server, "gpt-test");
        let out = m.complete("ping", Some("be brief")).await.unwrap();
        assert_eq!(out, "pong");
    }

    #[tokio::test]
    async fn embeddings_are_reordered_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .mount(&server)
            .await;

        let m = model(&server, "embed-test");
        let out = m.embed(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(out, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn http_error_is_model_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = model(&server, "gpt-test").complete("hi", None).await.unwrap_err();
        assert!(matches!(err, RepoWikiError::Model(_)));
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
