pub mod embedding;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod response;
pub mod store;

pub use embedding::{EmbeddingBackend, EmbeddingClient, EmbeddingConfig, EmbeddingProvider};
pub use engine::{
    EngineFactory, EngineSettings, QueryEngine, RagEngineFactory, RagQueryEngine, DEFAULT_TOP_K,
};
pub use error::RagError;
pub use ingest::{index_sources, IngestReport};
pub use pipeline::build_context_prompt;
pub use response::{QueryResponse, QueryUsage, SourcePassage};
pub use store::{
    CollectionSummary, DocumentInsert, DocumentRecord, PassageInsert, RagStore, ScoredPassage,
    STORE_FILE_NAME,
};
pub use isaac_llm::{LlmClient, LlmConfig, LlmProvider, LlmRequest, LlmResponse};
