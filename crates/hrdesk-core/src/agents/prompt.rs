//! Grounded prompt construction and citation extraction

use crate::retrieval::RetrievalResult;

/// Longest slice of a single passage placed in the prompt
pub const MAX_PASSAGE_CHARS: usize = 1500;

const SOURCES_PREFIX: &str = "[Sources:";

/// Build the system prompt: instructions, retrieved evidence, citation rules.
///
/// With no evidence the model is told so explicitly and asked to open with
/// `no_evidence_notice`.
pub fn build_system_prompt(
    instructions: &str,
    evidence: &RetrievalResult,
    max_passages: usize,
    no_evidence_notice: &str,
) -> String {
    if evidence.is_empty() {
        return format!(
            "{instructions}\n\n\
             RETRIEVED CONTEXT:\n\
             No documents in the knowledge base matched this question.\n\n\
             RULES:\n\
             - Begin your answer with exactly this sentence: \"{no_evidence_notice}\"\n\
             - Do NOT invent policy details, amounts, or plan names\n\
             - Suggest contacting HR directly for an authoritative answer\n\
             - Do not list any sources"
        );
    }

    let context_text = evidence
        .passages
        .iter()
        .take(max_passages)
        .map(|p| format!("[Source: {}]\n{}", p.source_id, truncate(&p.content, MAX_PASSAGE_CHARS)))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    format!(
        "{instructions}\n\n\
         RETRIEVED CONTEXT:\n{context_text}\n\n\
         CITATION RULES:\n\
         - Answer the question using only the context above\n\
         - If the context does not answer the question, say so plainly\n\
         - Do NOT include source citations inline in your response text\n\
         - At the very end of your response, add a blank line then list all sources you used in this format:\n  \
           [Sources: source1.pdf, source2.pdf]\n\
         - Only list sources you actually referenced in your answer"
    )
}

/// Cut at a char boundary, never mid code point
fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Split a completion into body text and the source ids listed on its
/// trailing `[Sources: ...]` line. Returns `None` for the ids when the model
/// did not include such a line.
pub fn extract_sources(completion: &str) -> (String, Option<Vec<String>>) {
    let trimmed = completion.trim_end();
    let Some(start) = trimmed.rfind(SOURCES_PREFIX) else {
        return (trimmed.to_string(), None);
    };

    let tail = &trimmed[start + SOURCES_PREFIX.len()..];
    let Some(end) = tail.find(']') else {
        return (trimmed.to_string(), None);
    };
    // only a trailing line counts
    if !tail[end + 1..].trim().is_empty() {
        return (trimmed.to_string(), None);
    }

    let ids = tail[..end]
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    (trimmed[..start].trim_end().to_string(), Some(ids))
}
