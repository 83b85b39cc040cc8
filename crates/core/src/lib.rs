mod chunk;
mod embedding;
mod error;
mod source;
mod stats;

pub use chunk::{content_hash, count_tokens, ChunkConfig, Chunker, TextChunk};
pub use embedding::{HashEmbedder, HashEmbedderConfig};
pub use error::{CoreError, Result};
pub use source::{load_source, markdown_to_text, SourceFormat, SourceText};
pub use stats::{estimate_tokens, estimate_tokens_with_bpe, TokenizerKind};
