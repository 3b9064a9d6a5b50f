use itertools::Itertools;

use crate::indexer::ScoredChunk;
use crate::llm::ChatMessage;

/// Instructions given to the chat model with every question
pub const SYSTEM_PROMPT: &str = "You are the question-answering assistant for an internal company knowledge base. \
Answer strictly from the content of the \"Reference documents\" below.

Rules:
1. Whenever the reference documents contain content related to the question (for example leave, attendance, policies, procedures, numbers of days or approvals), answer directly from that content. Do not wrongly conclude that the question cannot be answered.
2. Only when the reference documents are empty or entirely unrelated to the question, reply: \"The current knowledge base cannot fully answer this question\", and suggest contacting the relevant department or adding documents.
3. Keep answers concise and professional. State policies, procedures and figures as worded in the documents and do not rewrite key clauses.
4. Do not invent information that is not in the documents. If the documents do not mention a detail, say that the documents do not specify it.
";

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";
pub const NO_DOCUMENTS_FOUND: &str = "(no relevant documents found)";
pub const RETRIEVAL_ONLY_PREFIX: &str =
    "No language model is configured; showing the retrieved content only:\n\n";

/// Characters of a chunk shown in a source entry
pub const SOURCE_PREVIEW_CHARS: usize = 200;

/// Join retrieved chunk texts into the reference block of the prompt
#[inline]
pub fn format_context(chunks: &[ScoredChunk]) -> String {
    if chunks.is_empty() {
        return NO_DOCUMENTS_FOUND.to_string();
    }

    chunks
        .iter()
        .map(|chunk| chunk.content.as_str())
        .join(CONTEXT_SEPARATOR)
}

#[inline]
pub fn build_messages(context: &str, question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "[Reference documents]\n{}\n\n[Question] {}\n\n\
             Answer the question using only the reference documents above. \
             If they contain relevant content, summarize it into your answer.",
            context, question
        )),
    ]
}

/// The first `SOURCE_PREVIEW_CHARS` characters of `content`, with `...` when cut
#[inline]
pub fn preview(content: &str) -> String {
    match content.char_indices().nth(SOURCE_PREVIEW_CHARS) {
        Some((cut, _)) => {
            let (head, _) = content.split_at(cut);
            format!("{}...", head)
        }
        None => content.to_string(),
    }
}
