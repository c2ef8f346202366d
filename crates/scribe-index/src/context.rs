//! Embedding text for chunks.
//!
//! Prepending the path, language and line range to the raw chunk text lets
//! conceptual queries ("where is the cache invalidated?") match code whose
//! body never mentions the concept.

use crate::chunker::Chunk;

/// Text sent to the embedding provider for `chunk` (not what is stored).
#[must_use]
pub fn contextualize_for_embedding(chunk: &Chunk) -> String {
    let mut text = String::with_capacity(chunk.text.len() + 96);

    text.push_str("# ");
    text.push_str(&chunk.file_path);
    text.push('\n');

    if let Some(lang) = chunk.language {
        text.push_str("# Language: ");
        text.push_str(lang.id());
        text.push('\n');
    }

    text.push_str(&format!("# Lines {}-{}\n", chunk.start_line, chunk.end_line));
    text.push_str(&chunk.text);
    text
}

/// Short header for displaying a retrieved chunk.
#[must_use]
pub fn chunk_display_header(file_path: &str, start_line: usize, end_line: usize) -> String {
    format!("{file_path} (lines {start_line}-{end_line})")
}
