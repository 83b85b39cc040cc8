use anyhow::{anyhow, bail, Context, Result};
use bytemuck::{cast_slice, pod_collect_to_vec};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// File name used when a store is opened on a directory.
pub const STORE_FILE_NAME: &str = "vectors.sqlite";

/// Path-addressed vector store. Each call opens its own connection, so a
/// `RagStore` is cheap to clone and safe to move onto the blocking pool.
#[derive(Debug, Clone)]
pub struct RagStore {
    path: PathBuf,
}

impl RagStore {
    /// Opens the store at `path`. An existing file is used as the database
    /// itself; anything else is treated as a directory holding
    /// [`STORE_FILE_NAME`] and created when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let db_path = if path.is_file() {
            path.to_path_buf()
        } else {
            fs::create_dir_all(path)
                .with_context(|| format!("failed to create store directory {}", path.display()))?;
            path.join(STORE_FILE_NAME)
        };
        let store = Self { path: db_path };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    pub fn init(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS collections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                embedding_model TEXT,
                dimensions INTEGER,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                collection_id INTEGER NOT NULL,
                source_path TEXT NOT NULL,
                title TEXT,
                content_hash TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(collection_id, content_hash),
                FOREIGN KEY(collection_id) REFERENCES collections(id)
            );
            CREATE TABLE IF NOT EXISTS passages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                token_count INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY(document_id) REFERENCES documents(id)
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection_id);
            CREATE INDEX IF NOT EXISTS idx_passages_document ON passages(document_id);
            "#,
        )?;
        Ok(())
    }

    /// Get-or-create by name.
    pub fn ensure_collection(&self, name: &str) -> Result<i64> {
        if name.trim().is_empty() {
            bail!("collection name must not be empty");
        }
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT id FROM collections WHERE name = ?1")?;
        if let Some(id) = stmt.query_row([name], |row| row.get(0)).optional()? {
            return Ok(id);
        }
        conn.execute("INSERT INTO collections (name) VALUES (?1)", params![name])?;
        Ok(conn.last_insert_rowid())
    }

    /// Embedding model and dimensions the collection was indexed with, if any
    /// passages have been added yet.
    pub fn collection_embedding(&self, name: &str) -> Result<Option<(String, usize)>> {
        let conn = self.connection()?;
        let row: Option<(Option<String>, Option<i64>)> = conn
            .query_row(
                "SELECT embedding_model, dimensions FROM collections WHERE name = ?1",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(match row {
            Some((Some(model), Some(dims))) => Some((model, dims as usize)),
            _ => None,
        })
    }

    /// Records the embedding model on first use and rejects a different one
    /// afterwards.
    pub fn bind_embedding(&self, collection_id: i64, model: &str, dimensions: usize) -> Result<()> {
        let conn = self.connection()?;
        let current: (Option<String>, Option<i64>) = conn.query_row(
            "SELECT embedding_model, dimensions FROM collections WHERE id = ?1",
            [collection_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        match current {
            (Some(existing), Some(dims)) => {
                if existing != model || dims as usize != dimensions {
                    bail!(
                        "collection is indexed with {existing} ({dims} dims), not {model} ({dimensions} dims)"
                    );
                }
                Ok(())
            }
            _ => {
                conn.execute(
                    "UPDATE collections SET embedding_model = ?1, dimensions = ?2 WHERE id = ?3",
                    params![model, dimensions as i64, collection_id],
                )?;
                Ok(())
            }
        }
    }

    pub fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                collections.name,
                collections.embedding_model,
                collections.dimensions,
                (SELECT COUNT(*) FROM documents WHERE documents.collection_id = collections.id),
                (SELECT COUNT(*) FROM passages
                    JOIN documents ON passages.document_id = documents.id
                    WHERE documents.collection_id = collections.id)
            FROM collections
            ORDER BY collections.name
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(CollectionSummary {
                name: row.get(0)?,
                embedding_model: row.get(1)?,
                dimensions: row.get::<_, Option<i64>>(2)?.map(|d| d as usize),
                documents: row.get::<_, i64>(3)? as usize,
                passages: row.get::<_, i64>(4)? as usize,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn find_document(&self, collection_id: i64, content_hash: &str) -> Result<Option<i64>> {
        let conn = self.connection()?;
        let id = conn
            .query_row(
                "SELECT id FROM documents WHERE collection_id = ?1 AND content_hash = ?2",
                params![collection_id, content_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn add_document(&self, collection_id: i64, doc: &DocumentInsert) -> Result<DocumentRecord> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO documents (collection_id, source_path, title, content_hash) VALUES (?1, ?2, ?3, ?4)",
            params![collection_id, doc.source_path, doc.title, doc.content_hash],
        )?;
        let id = conn.last_insert_rowid();
        Ok(DocumentRecord {
            id,
            source_path: doc.source_path.clone(),
        })
    }

    pub fn add_passages(&self, document_id: i64, passages: &[PassageInsert]) -> Result<usize> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        for passage in passages {
            let embedding_blob = cast_slice::<f32, u8>(&passage.embedding);
            tx.execute(
                "INSERT INTO passages (document_id, chunk_index, text, token_count, embedding) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    document_id,
                    passage.chunk_index as i64,
                    passage.text,
                    passage.token_count as i64,
                    embedding_blob
                ],
            )?;
        }
        tx.commit()?;
        Ok(passages.len())
    }

    /// Cosine top-k over every passage of `collection`. Unknown collections
    /// yield no hits.
    pub fn search_passages(
        &self,
        collection: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT
                passages.id,
                documents.source_path,
                documents.title,
                passages.chunk_index,
                passages.text,
                passages.embedding
            FROM passages
            JOIN documents ON passages.document_id = documents.id
            JOIN collections ON documents.collection_id = collections.id
            WHERE collections.name = ?1
            "#,
        )?;
        let mut rows = stmt.query([collection])?;
        let mut hits = Vec::new();
        while let Some(row) = rows.next()? {
            let embedding_blob: Vec<u8> = row.get(5)?;
            if embedding_blob.len() % std::mem::size_of::<f32>() != 0 {
                return Err(anyhow!("invalid embedding blob in collection {collection}"));
            }
            let embedding: Vec<f32> = pod_collect_to_vec(&embedding_blob);
            if embedding.len() != query_embedding.len() {
                bail!(
                    "embedding dimension mismatch in collection {collection}: stored {}, query {}",
                    embedding.len(),
                    query_embedding.len()
                );
            }
            hits.push(ScoredPassage {
                passage_id: row.get(0)?,
                document_source: row.get(1)?,
                title: row.get(2)?,
                chunk_index: row.get(3)?,
                text: row.get(4)?,
                score: cosine_similarity(query_embedding, &embedding),
            });
        }
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[derive(Debug, Clone)]
pub struct DocumentInsert {
    pub source_path: String,
    pub title: Option<String>,
    pub content_hash: String,
}

#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: i64,
    pub source_path: String,
}

#[derive(Debug, Clone)]
pub struct PassageInsert {
    pub chunk_index: usize,
    pub text: String,
    pub token_count: usize,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub name: String,
    pub embedding_model: Option<String>,
    pub dimensions: Option<usize>,
    pub documents: usize,
    pub passages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredPassage {
    pub passage_id: i64,
    pub document_source: String,
    pub title: Option<String>,
    pub chunk_index: i64,
    pub text: String,
    pub score: f32,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    dot / (a_norm.sqrt() * b_norm.sqrt())
}
