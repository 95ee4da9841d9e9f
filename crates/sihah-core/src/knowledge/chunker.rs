//! Semantic text chunking for document ingestion.
//!
//! Uses the `text-splitter` crate, which prefers paragraph, then sentence,
//! then word boundaries before falling back to characters. Chunks are
//! trimmed and never exceed `max_chars` characters.

use text_splitter::TextSplitter;

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_CHARS: usize = 512;

/// Split `text` into trimmed chunks of at most `max_chars` characters.
///
/// Whitespace-only input yields no chunks.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let splitter = TextSplitter::new(max_chars.max(1));
    splitter
        .chunks(text)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk_text("שעות הפתיחה שלנו הן 9:00-17:00.", 512);
        assert_eq!(chunks, vec!["שעות הפתיחה שלנו הן 9:00-17:00."]);
    }

    #[test]
    fn long_text_respects_limit() {
        let paragraph = "המשלוח מגיע תוך שלושה ימי עסקים. ".repeat(40);
        let chunks = chunk_text(&paragraph, 100);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(chunk_text("   \n\n  ", 64).is_empty());
        assert!(chunk_text("", 64).is_empty());
    }
}
