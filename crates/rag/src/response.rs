use std::fmt;

use serde::Serialize;

use crate::store::ScoredPassage;

/// Passage that was placed in the prompt context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourcePassage {
    pub document_source: String,
    pub title: Option<String>,
    pub chunk_index: i64,
    pub score: f32,
    pub text: String,
}

impl From<ScoredPassage> for SourcePassage {
    fn from(value: ScoredPassage) -> Self {
        Self {
            document_source: value.document_source,
            title: value.title,
            chunk_index: value.chunk_index,
            score: value.score,
            text: value.text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueryUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub context_tokens_estimate: u32,
}

/// Answer to one natural-language query. `content` is the generated text;
/// `Display` renders exactly that text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResponse {
    pub content: String,
    pub sources: Vec<SourcePassage>,
    pub usage: QueryUsage,
}

impl QueryResponse {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

impl fmt::Display for QueryResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}
