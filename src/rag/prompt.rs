//! Prompt augmentation.
//!
//! Pure text assembly: the retrieved fragments plus the user's question in
//! a fixed instruction template. No I/O and no clock, so the same question
//! and fragments always produce the same prompt, byte for byte.

use super::store::RetrievedActivity;

const INSTRUCTION: &str = "You are a personal assistant for a student. \
Answer the question using the context below when it is relevant. \
If the context does not contain the answer, say you do not know based on the stored activities.";

const EMPTY_CONTEXT: &str = "(no stored activities matched)";

/// Build the generation prompt from the question and retrieved fragments.
///
/// Fragments are rendered as `source_kind: text` lines in retrieval order.
pub fn augment(question: &str, context: &[RetrievedActivity]) -> String {
    let mut prompt = String::new();
    prompt.push_str(INSTRUCTION);
    prompt.push_str("\n\nContext:\n");

    if context.is_empty() {
        prompt.push_str(EMPTY_CONTEXT);
        prompt.push('\n');
    } else {
        for item in context {
            prompt.push_str(&item.record.source_kind);
            prompt.push_str(": ");
            prompt.push_str(&item.record.text);
            prompt.push('\n');
        }
    }

    prompt.push_str("\nQuestion: ");
    prompt.push_str(question);
    prompt.push_str("\nAnswer:");
    prompt
}
