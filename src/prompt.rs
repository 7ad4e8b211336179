//! Prompt assembly.
//!
//! Retrieved chunks are rendered as `Source: <filename>\n<text>` blocks,
//! separated by a blank line, in rank order. The block and the question are
//! substituted into [`PROMPT_TEMPLATE`] by plain interpolation; user text is
//! not escaped.

use docqa_core::models::RetrievedChunk;

/// Instruction sent with every question. Placeholders: `{context}`, `{question}`.
pub const PROMPT_TEMPLATE: &str = "Answer the question based ONLY on the context.
If unsure, say you don't know.

Context: {context}
Question: {question}";

/// Render retrieved chunks into a context block.
///
/// An empty slice yields an empty string; the model is then expected to say
/// it does not know.
pub fn build_context(hits: &[RetrievedChunk]) -> String {
    hits.iter()
        .map(|h| format!("Source: {}\n{}", h.chunk.source, h.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fill the template's placeholders in a single pass.
///
/// Placeholder-looking text inside `context` or `question` is left as is.
pub fn render_prompt(template: &str, context: &str, question: &str) -> String {
    let mut out = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{context}") {
            out.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            out.push_str(question);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Distinct sources of `hits`, in rank order.
pub fn cited_sources(hits: &[RetrievedChunk]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for h in hits {
        if !out.contains(&h.chunk.source) {
            out.push(h.chunk.source.clone());
        }
    }
    out
}
