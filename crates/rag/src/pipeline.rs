use isaac_llm::{CONTEXT_END, CONTEXT_START};

use crate::store::ScoredPassage;

const PREAMBLE: &str = "You are a clinical decision-support assistant for sepsis management. \
Base your answer on the information in CONTEXT and say so when CONTEXT does not cover the question.";

/// Retrieval prompt: preamble, the retrieved passages between the context
/// markers, then the caller's question.
pub fn build_context_prompt(passages: &[ScoredPassage], question: &str) -> String {
    let mut context = String::new();
    context.push_str(PREAMBLE);
    context.push_str("\n\n");
    context.push_str(CONTEXT_START);
    context.push('\n');
    for (idx, passage) in passages.iter().enumerate() {
        context.push_str(&format!(
            "[SOURCE {}: {}, passage {}]\n{}\n\n",
            idx + 1,
            passage.document_source,
            passage.chunk_index,
            passage.text.trim()
        ));
    }
    context.push_str(CONTEXT_END);
    context.push_str("\n\n");
    format!("{}Question: {}\nAnswer:", context, question.trim())
}
