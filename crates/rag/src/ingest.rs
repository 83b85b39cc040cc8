use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use isaac_core::{load_source, ChunkConfig, Chunker};

use crate::embedding::EmbeddingClient;
use crate::store::{DocumentInsert, PassageInsert, RagStore};

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub collection: String,
    pub documents_indexed: usize,
    pub documents_skipped: usize,
    pub passages_indexed: usize,
}

/// Loads, chunks, embeds and stores each file into `collection`. Files whose
/// content is already present in the collection are skipped.
pub async fn index_sources(
    store: &RagStore,
    embeddings: &EmbeddingClient,
    collection: &str,
    paths: &[impl AsRef<Path>],
    chunk_config: ChunkConfig,
) -> Result<IngestReport> {
    let collection_id = store.ensure_collection(collection)?;
    let chunker = Chunker::new(chunk_config);
    let mut report = IngestReport {
        collection: collection.to_string(),
        ..Default::default()
    };
    for path in paths {
        let path = path.as_ref();
        let source =
            load_source(path).with_context(|| format!("failed to load {}", path.display()))?;
        if store
            .find_document(collection_id, &source.content_hash)?
            .is_some()
        {
            info!(path = %path.display(), collection, "already indexed; skipping");
            report.documents_skipped += 1;
            continue;
        }
        let chunks = chunker.chunk_text(&source.text);
        if chunks.is_empty() {
            warn!(path = %path.display(), "no passages produced");
            report.documents_skipped += 1;
            continue;
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embeddings.embed_batch(&texts).await?;
        if let Some(first) = vectors.first() {
            store.bind_embedding(collection_id, &embeddings.model_name(), first.len())?;
        }
        let doc = store.add_document(
            collection_id,
            &DocumentInsert {
                source_path: path.display().to_string(),
                title: source.title.clone(),
                content_hash: source.content_hash.clone(),
            },
        )?;
        let passages: Vec<PassageInsert> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, embedding)| PassageInsert {
                chunk_index: chunk.chunk_index,
                text: chunk.text,
                token_count: chunk.token_count,
                embedding,
            })
            .collect();
        let added = store.add_passages(doc.id, &passages)?;
        info!(path = %path.display(), collection, passages = added, "indexed");
        report.documents_indexed += 1;
        report.passages_indexed += added;
    }
    Ok(report)
}
