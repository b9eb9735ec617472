//! Grounded prompt assembly and the offline fallback answer.
//!
//! The prompt lists retrieved chunks in descending-score order as numbered
//! blocks (`[1]`, `[2]`, …) tagged with their source, so the model can cite
//! them inline. Only blocks that fit in the context budget are included,
//! and only included blocks become citations.
//!
//! When nothing was retrieved the prompt says so explicitly with
//! [`NO_CONTEXT_MARKER`] instead of leaving the context section blank.

use crate::models::{Citation, RetrievalResult};

/// System message sent with every grounded prompt.
pub const SYSTEM_INSTRUCTIONS: &str = "You are a careful retrieval assistant. Answer using the provided context only. \
If information is missing, explicitly say you could not find it in the documents.";

/// Stands in for the context section when retrieval found nothing.
pub const NO_CONTEXT_MARKER: &str = "NO GROUNDING CONTEXT AVAILABLE";

/// Heading of every degraded answer.
pub const FALLBACK_HEADER: &str = "[fallback mode] The answer service is unavailable, so no summary was generated.";

/// Maximum characters of a chunk quoted in a fallback answer.
const FALLBACK_EXCERPT_CHARS: usize = 400;

/// A prompt together with the citations it actually contains.
#[derive(Debug, Clone)]
pub struct PromptPlan {
    pub prompt: String,
    pub citations: Vec<Citation>,
}

/// Build the user prompt for `question` from `retrieval`.
///
/// Blocks are appended in retrieval order until the next one would push
/// the combined block text past `max_context_chars`. The first block is
/// always included, truncated if needed, so a single long chunk never
/// silences the context entirely.
pub fn build_prompt(question: &str, retrieval: &RetrievalResult, max_context_chars: usize) -> PromptPlan {
    let mut blocks: Vec<String> = Vec::new();
    let mut citations = Vec::new();
    let mut used = 0usize;

    for chunk in &retrieval.chunks {
        let rank = citations.len() + 1;
        let header = format!(
            "[{}] Source: {} (chunk {}) | Relevance: {:.3}",
            rank, chunk.source_name, chunk.sequence_index, chunk.score
        );
        let body_len = chunk.text.chars().count();
        let block_len = header.chars().count() + 1 + body_len;

        let body = if used + block_len <= max_context_chars {
            chunk.text.clone()
        } else if blocks.is_empty() {
            let room = max_context_chars.saturating_sub(header.chars().count() + 1);
            if room == 0 {
                break;
            }
            chunk.text.chars().take(room).collect()
        } else {
            break;
        };

        used += header.chars().count() + 1 + body.chars().count();
        blocks.push(format!("{}\n{}", header, body));
        citations.push(Citation {
            rank,
            chunk_id: chunk.chunk_id.clone(),
            source_name: chunk.source_name.clone(),
            sequence_index: chunk.sequence_index,
            score: chunk.score,
            excerpt: body,
        });
    }

    let context = if blocks.is_empty() {
        NO_CONTEXT_MARKER.to_string()
    } else {
        blocks.join("\n\n")
    };

    let prompt = format!(
        "Use the context below to answer the question. \
         Only state information that appears in the context. \
         If the context is insufficient, say so explicitly.\n\n\
         Question: {}\n\n\
         Context:\n{}\n\n\
         Answer with a concise explanation and include references in [n] format.",
        question.trim(),
        context
    );

    PromptPlan { prompt, citations }
}

/// Deterministic degraded answer built only from the cited excerpts.
pub fn fallback_answer(question: &str, citations: &[Citation]) -> String {
    let mut out = String::from(FALLBACK_HEADER);
    out.push_str("\n\nQuestion: ");
    out.push_str(question.trim());
    out.push_str("\n\n");

    if citations.is_empty() {
        out.push_str("No sufficiently relevant passages were found in the indexed documents.");
        return out;
    }

    out.push_str("Most relevant passages from your documents:\n");
    for c in citations {
        let excerpt: String = c.excerpt.chars().take(FALLBACK_EXCERPT_CHARS).collect();
        let ellipsis = if c.excerpt.chars().count() > FALLBACK_EXCERPT_CHARS {
            "…"
        } else {
            ""
        };
        out.push_str(&format!(
            "\n[{}] {} (similarity {:.3})\n{}{}\n",
            c.rank, c.source_name, c.score, excerpt, ellipsis
        ));
    }
    out
}
