use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tiktoken_rs::CoreBPE;
use tracing::warn;

static TOKENIZER: Lazy<Option<CoreBPE>> = Lazy::new(|| match tiktoken_rs::cl100k_base() {
    Ok(bpe) => Some(bpe),
    Err(err) => {
        warn!("tokenizer_unavailable" = %err, "falling back to word counts");
        None
    }
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkConfig {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_tokens: 384,
            overlap_tokens: 48,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextChunk {
    pub chunk_index: usize,
    pub text: String,
    pub token_count: usize,
    pub content_hash: String,
}

/// Packs paragraphs into passages of at most `max_tokens`, repeating trailing
/// paragraphs of the previous passage up to `overlap_tokens`.
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn chunk_text(&self, text: &str) -> Vec<TextChunk> {
        let max_tokens = self.config.max_tokens.max(1);
        let overlap_tokens = self.config.overlap_tokens.min(max_tokens.saturating_sub(1));
        let units = split_units(text, max_tokens);
        if units.is_empty() {
            return Vec::new();
        }
        let tokens_per_unit: Vec<usize> = units.iter().map(|u| count_tokens(u).max(1)).collect();
        let mut start = 0usize;
        let mut chunks = Vec::new();
        while start < units.len() {
            let mut end = start;
            let mut used_tokens = 0usize;
            while end < units.len() {
                let unit_tokens = tokens_per_unit[end];
                if end > start && used_tokens + unit_tokens > max_tokens {
                    break;
                }
                used_tokens += unit_tokens;
                end += 1;
            }
            chunks.push(build_chunk(chunks.len(), &units[start..end], used_tokens));
            if end == units.len() {
                break;
            }
            if overlap_tokens == 0 {
                start = end;
                continue;
            }
            let mut back_tokens = 0usize;
            let mut new_start = end;
            while new_start > start + 1 {
                let candidate = tokens_per_unit[new_start - 1];
                if back_tokens + candidate > overlap_tokens {
                    break;
                }
                back_tokens += candidate;
                new_start -= 1;
            }
            start = new_start;
        }
        chunks
    }
}

pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

pub fn count_tokens(text: &str) -> usize {
    match TOKENIZER.as_ref() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => text.split_whitespace().count(),
    }
}

fn build_chunk(chunk_index: usize, units: &[String], token_count: usize) -> TextChunk {
    let text = units.join("\n\n");
    TextChunk {
        chunk_index,
        content_hash: content_hash(&text),
        text,
        token_count,
    }
}

fn split_units(text: &str, max_tokens: usize) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let mut units = Vec::new();
    for paragraph in normalized.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }
        if count_tokens(paragraph) <= max_tokens {
            units.push(paragraph.to_string());
            continue;
        }
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{current} {word}");
            if count_tokens(&candidate) > max_tokens {
                units.push(std::mem::replace(&mut current, word.to_string()));
            } else {
                current = candidate;
            }
        }
        if !current.is_empty() {
            units.push(current);
        }
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_text_is_one_chunk() {
        let chunker = Chunker::new(ChunkConfig::default());
        let chunks = chunker.chunk_text("Measure lactate.\n\nObtain blood cultures.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Measure lactate.\n\nObtain blood cultures.");
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].content_hash, content_hash(&chunks[0].text));
    }

    #[test]
    fn blank_text_has_no_chunks() {
        let chunker = Chunker::new(ChunkConfig::default());
        assert!(chunker.chunk_text("\n\n   \r\n\r\n").is_empty());
    }

    #[test]
    fn long_paragraphs_are_split_within_budget() {
        let chunker = Chunker::new(ChunkConfig {
            max_tokens: 16,
            overlap_tokens: 0,
        });
        let paragraph = "fluids ".repeat(100);
        let chunks = chunker.chunk_text(&paragraph);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.token_count <= 16, "chunk too large: {}", chunk.token_count);
        }
        let words: usize = chunks
            .iter()
            .map(|c| c.text.split_whitespace().count())
            .sum();
        assert_eq!(words, 100);
    }

    #[test]
    fn overlap_repeats_trailing_paragraph() {
        let chunker = Chunker::new(ChunkConfig {
            max_tokens: 12,
            overlap_tokens: 6,
        });
        let text = "alpha beta gamma\n\ndelta epsilon zeta\n\neta theta iota\n\nkappa lambda mu\n\nnu xi omicron";
        let chunks = chunker.chunk_text(text);
        assert!(chunks.len() >= 2);
        let first_last = chunks[0].text.rsplit("\n\n").next().unwrap();
        assert!(chunks[1].text.starts_with(first_last));
    }
}
