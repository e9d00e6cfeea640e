//! Grounding prompt assembly.

use quill_index::ScoredChunk;

/// What the model is told to answer when the context lacks the answer.
pub const NO_ANSWER: &str = "I don't have enough information to answer that question.";

const SEPARATOR: &str = "\n\n";

/// Retrieved chunks rendered into a bounded context block.
#[derive(Debug, Clone, Default)]
pub struct GroundingContext {
    pub text: String,
    /// Exactly the chunks present in `text`, in ranked order.
    pub sources: Vec<ScoredChunk>,
}

impl GroundingContext {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Render ranked chunks as `Document <n> (source: <source>)` entries until the next entry
/// would push the block past `max_chars` characters.
///
/// The best chunk is always included; when it alone exceeds the budget it is cut at a
/// character boundary.
#[must_use]
pub fn build_context(chunks: Vec<ScoredChunk>, max_chars: usize) -> GroundingContext {
    let mut context = GroundingContext::default();
    let mut used = 0usize;

    for chunk in chunks {
        let entry = format!(
            "Document {} (source: {}):\n{}",
            context.sources.len() + 1,
            chunk.chunk.source(),
            chunk.chunk.content
        );
        let entry_chars = entry.chars().count();

        if context.sources.is_empty() {
            if entry_chars > max_chars {
                context.text = entry.chars().take(max_chars).collect();
                context.sources.push(chunk);
                break;
            }
            context.text = entry;
            used = entry_chars;
            context.sources.push(chunk);
            continue;
        }

        let needed = SEPARATOR.len() + entry_chars;
        if used + needed > max_chars {
            break;
        }
        context.text.push_str(SEPARATOR);
        context.text.push_str(&entry);
        used += needed;
        context.sources.push(chunk);
    }

    context
}

#[must_use]
pub fn grounded_prompt(question: &str, context: &str) -> String {
    format!(
        "Based on the following context documents, please answer the question.\n\
         If the answer cannot be found in the context, say \"{NO_ANSWER}\"\n\n\
         Context:\n{context}\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}

/// Prompt used when retrieval found nothing to ground the answer in.
#[must_use]
pub fn ungrounded_prompt(question: &str) -> String {
    format!(
        "No reference documents were found for this question. \
         Answer it as best you can and say so if you are unsure.\n\n\
         Question: {question}\n\n\
         Answer:"
    )
}
