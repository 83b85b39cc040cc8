use isaac_core::{ChunkConfig, Chunker};
use proptest::prelude::*;

proptest! {
    #[test]
    fn chunks_without_overlap_preserve_every_word(paragraphs in paragraph_vec(), max_tokens in 8usize..64) {
        let text = paragraphs.join("\n\n");
        let chunker = Chunker::new(ChunkConfig { max_tokens, overlap_tokens: 0 });
        let chunks = chunker.chunk_text(&text);
        let original: Vec<&str> = text.split_whitespace().collect();
        let rebuilt: Vec<String> = chunks
            .iter()
            .flat_map(|c| c.text.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect();
        prop_assert_eq!(original, rebuilt);
        for (idx, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.chunk_index, idx);
            prop_assert!(!chunk.text.trim().is_empty());
        }
    }

    #[test]
    fn overlapping_chunks_always_make_progress(paragraphs in paragraph_vec(), overlap in 0usize..32) {
        let text = paragraphs.join("\n\n");
        let chunker = Chunker::new(ChunkConfig { max_tokens: 32, overlap_tokens: overlap });
        let chunks = chunker.chunk_text(&text);
        let words = text.split_whitespace().count();
        prop_assert!(chunks.len() <= words.max(1));
        if let Some(last) = chunks.last() {
            let last_word = text.split_whitespace().last().unwrap();
            prop_assert!(last.text.ends_with(last_word));
        }
    }
}

fn paragraph_vec() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{2,9}( [a-z]{2,9}){0,30}", 1..12)
}
