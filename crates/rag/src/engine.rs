use std::path::{Path, PathBuf};

use async_trait::async_trait;
use isaac_core::count_tokens;
use isaac_llm::{LlmClient, LlmConfig, LlmRequest};
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::{debug, info, warn};

use crate::embedding::{EmbeddingClient, EmbeddingConfig};
use crate::error::RagError;
use crate::pipeline::build_context_prompt;
use crate::response::{QueryResponse, QueryUsage, SourcePassage};
use crate::store::RagStore;

/// Something that answers natural-language queries against one collection.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    fn collection(&self) -> &str;

    async fn query(&self, prompt: &str) -> Result<QueryResponse, RagError>;
}

/// Builds a [`QueryEngine`] bound to `(storage_path, collection)`.
pub trait EngineFactory: Send + Sync {
    fn create_query_engine(
        &self,
        storage_path: &Path,
        collection: &str,
    ) -> Result<Box<dyn QueryEngine>, RagError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub top_k: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            llm: LlmConfig::local(),
            embedding: EmbeddingConfig::default(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

pub const DEFAULT_TOP_K: usize = 4;

/// Factory over the SQLite vector store, the configured embedding model and
/// the configured completion endpoint.
#[derive(Debug, Clone)]
pub struct RagEngineFactory {
    settings: EngineSettings,
}

impl RagEngineFactory {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn open(&self, storage_path: &Path, collection: &str) -> Result<RagQueryEngine, RagError> {
        let store = RagStore::open(storage_path).map_err(|e| RagError::storage(storage_path, e))?;
        store
            .ensure_collection(collection)
            .map_err(|e| RagError::storage(storage_path, e))?;
        let embeddings = EmbeddingClient::new(&self.settings.embedding)
            .map_err(|e| RagError::Config(format!("{e:#}")))?;
        let bound = store
            .collection_embedding(collection)
            .map_err(|e| RagError::storage(storage_path, e))?;
        if let Some((model, _)) = bound {
            if model != embeddings.model_name() {
                return Err(RagError::storage(
                    storage_path,
                    format!(
                        "collection {collection} was indexed with {model} but queries embed with {}",
                        embeddings.model_name()
                    ),
                ));
            }
        }
        let llm = LlmClient::new(&self.settings.llm).map_err(|e| RagError::Config(format!("{e:#}")))?;
        debug!(
            collection,
            store = %store.path().display(),
            model = llm.model(),
            "query engine ready"
        );
        Ok(RagQueryEngine {
            storage_path: storage_path.to_path_buf(),
            store,
            collection: collection.to_string(),
            embeddings,
            llm,
            top_k: self.settings.top_k.max(1),
        })
    }
}

impl EngineFactory for RagEngineFactory {
    fn create_query_engine(
        &self,
        storage_path: &Path,
        collection: &str,
    ) -> Result<Box<dyn QueryEngine>, RagError> {
        Ok(Box::new(self.open(storage_path, collection)?))
    }
}

pub struct RagQueryEngine {
    storage_path: PathBuf,
    store: RagStore,
    collection: String,
    embeddings: EmbeddingClient,
    llm: LlmClient,
    top_k: usize,
}

#[async_trait]
impl QueryEngine for RagQueryEngine {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn query(&self, prompt: &str) -> Result<QueryResponse, RagError> {
        if prompt.trim().is_empty() {
            return Err(RagError::InvalidInput("query text is empty".to_string()));
        }
        let query_embedding = self
            .embeddings
            .embed(prompt)
            .await
            .map_err(|e| RagError::upstream("embedding model", e))?;
        let store = self.store.clone();
        let collection = self.collection.clone();
        let top_k = self.top_k;
        let hits = task::spawn_blocking(move || {
            store.search_passages(&collection, &query_embedding, top_k)
        })
        .await
        .map_err(|e| RagError::storage(&self.storage_path, e))?
        .map_err(|e| RagError::storage(&self.storage_path, e))?;
        if hits.is_empty() {
            warn!(collection = %self.collection, "no passages retrieved; answering without context");
        }
        let full_prompt = build_context_prompt(&hits, prompt);
        let response = self
            .llm
            .chat(&LlmRequest {
                system: None,
                user: full_prompt.clone(),
            })
            .await
            .map_err(|e| RagError::upstream("llm", e))?;
        info!(
            collection = %self.collection,
            passages = hits.len(),
            prompt_tokens = response.prompt_tokens,
            completion_tokens = response.completion_tokens,
            "query answered"
        );
        Ok(QueryResponse {
            content: response.content,
            sources: hits.into_iter().map(SourcePassage::from).collect(),
            usage: QueryUsage {
                prompt_tokens: response.prompt_tokens,
                completion_tokens: response.completion_tokens,
                context_tokens_estimate: count_tokens(&full_prompt) as u32,
            },
        })
    }
}
