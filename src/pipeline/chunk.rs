//! Chunker: split oversized page text into transform-safe segments.
//!
//! External translators cap their input size, so a page is cut into
//! [`Chunk`]s of at most `max_chunk_bytes` bytes. Cut points are chosen in
//! order of preference:
//!
//! 1. after the last paragraph break (`\n\n`) inside the window
//! 2. after the last sentence terminator followed by whitespace
//! 3. after the last whitespace character
//! 4. a hard cut at the last UTF-8 character boundary
//!
//! Chunks are lossless: concatenating `chunk.text` in ordinal order gives back
//! the page exactly. The whitespace framing each chunk (a trailing paragraph
//! break, for example) is kept out of the transform input and restored by
//! [`Chunk::reframe`], which is how paragraph breaks survive translation.

use once_cell::sync::Lazy;
use regex::Regex;

/// Sentence terminator, optional closing quote/bracket, then whitespace.
static RE_SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?।。]["'”’)\]]*\s+"#).unwrap());

/// A bounded substring of a page, with its position within the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based position within the page.
    pub ordinal: usize,
    /// Exact source text, including surrounding whitespace.
    pub text: String,
}

impl Chunk {
    /// The text actually sent to the transform (whitespace framing removed).
    ///
    /// This is also what the result cache is keyed on.
    pub fn payload(&self) -> &str {
        self.text.trim()
    }

    /// `true` when there is nothing worth sending to the transform.
    pub fn is_blank(&self) -> bool {
        self.payload().is_empty()
    }

    /// Put the chunk's original leading/trailing whitespace around `output`.
    pub fn reframe(&self, output: &str) -> String {
        let leading_len = self.text.len() - self.text.trim_start().len();
        let trailing_start = self.text.trim_end().len().max(leading_len);
        let leading = &self.text[..leading_len];
        let trailing = &self.text[trailing_start..];

        let mut out = String::with_capacity(leading.len() + output.len() + trailing.len());
        out.push_str(leading);
        out.push_str(output.trim());
        out.push_str(trailing);
        out
    }
}

/// Split `page_text` into ordered chunks of at most `max_chunk_bytes` bytes.
///
/// An empty page yields no chunks. `max_chunk_bytes` is raised to 4 so that
/// any single UTF-8 character always fits.
pub fn split(page_text: &str, max_chunk_bytes: usize) -> Vec<Chunk> {
    let max = max_chunk_bytes.max(4);
    let mut chunks = Vec::new();
    let mut rest = page_text;

    while !rest.is_empty() {
        let cut = if rest.len() <= max {
            rest.len()
        } else {
            find_cut(rest, max)
        };
        let (head, tail) = rest.split_at(cut);
        chunks.push(Chunk {
            ordinal: chunks.len(),
            text: head.to_string(),
        });
        rest = tail;
    }

    chunks
}

/// Concatenate per-chunk outputs in ordinal order.
///
/// No separator is inserted; any whitespace between chunks is already part of
/// the reframed outputs.
pub fn join<S: AsRef<str>>(ordered_outputs: &[S]) -> String {
    let len = ordered_outputs.iter().map(|s| s.as_ref().len()).sum();
    let mut page = String::with_capacity(len);
    for out in ordered_outputs {
        page.push_str(out.as_ref());
    }
    page
}

/// Choose a cut position (byte offset, on a char boundary, > 0) within `max`.
fn find_cut(text: &str, max: usize) -> usize {
    let window = &text[..floor_char_boundary(text, max)];

    if let Some(idx) = window.rfind("\n\n") {
        return idx + 2;
    }

    if let Some(m) = RE_SENTENCE_END.find_iter(window).last() {
        return m.end();
    }

    if let Some((idx, ch)) = window.char_indices().rev().find(|(_, c)| c.is_whitespace()) {
        let cut = idx + ch.len_utf8();
        if cut > 0 {
            return cut;
        }
    }

    if window.is_empty() {
        // Only reachable if the first char is wider than `max`.
        text.chars().next().map(char::len_utf8).unwrap_or(text.len())
    } else {
        window.len()
    }
}

/// Largest char boundary `<= index`.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    let mut i = index;
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn concat(chunks: &[Chunk]) -> String {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn short_page_is_single_chunk() {
        let chunks = split("Hello World", 4000);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].text, "Hello World");
    }

    #[test]
    fn empty_page_has_no_chunks() {
        assert!(split("", 100).is_empty());
    }

    #[test]
    fn prefers_paragraph_boundary() {
        let text = "First paragraph here.\n\nSecond paragraph that is longer.";
        let chunks = split(text, 30);
        assert_eq!(chunks[0].text, "First paragraph here.\n\n");
        assert_eq!(concat(&chunks), text);
    }

    #[test]
    fn falls_back_to_sentence_boundary() {
        let text = "One sentence. Two sentence. Three sentence.";
        let chunks = split(text, 20);
        assert_eq!(chunks[0].text, "One sentence. ");
        assert!(chunks.iter().all(|c| c.text.len() <= 20));
        assert_eq!(concat(&chunks), text);
    }

    #[test]
    fn falls_back_to_whitespace() {
        let text = "alpha beta gamma delta epsilon";
        let chunks = split(text, 12);
        assert_eq!(chunks[0].text, "alpha beta ");
        assert_eq!(concat(&chunks), text);
    }

    #[test]
    fn hard_cut_without_boundaries() {
        let text = "x".repeat(50);
        let chunks = split(&text, 16);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.text.len() <= 16));
        assert_eq!(concat(&chunks), text);
    }

    #[test]
    fn never_splits_multibyte_chars() {
        // Each Devanagari letter is 3 bytes; 16 is not a multiple of 3.
        let text = "नमस्ते".repeat(10);
        let chunks = split(&text, 16);
        for c in &chunks {
            assert!(c.text.len() <= 16);
            assert!(!c.text.is_empty());
        }
        assert_eq!(concat(&chunks), text);
    }

    #[test]
    fn ordinals_are_contiguous() {
        let text = "a b c d e f g h i j k l m n o p q r s t u v w x y z ".repeat(5);
        let chunks = split(&text, 16);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal, i);
        }
    }

    #[test]
    fn reframe_restores_paragraph_break() {
        let chunk = Chunk {
            ordinal: 0,
            text: "  Hello world.\n\n".into(),
        };
        assert_eq!(chunk.payload(), "Hello world.");
        assert_eq!(chunk.reframe(" namaste duniya. "), "  namaste duniya.\n\n");
    }

    #[test]
    fn reframe_blank_chunk_keeps_whitespace() {
        let chunk = Chunk {
            ordinal: 3,
            text: "\n\n\n".into(),
        };
        assert!(chunk.is_blank());
        assert_eq!(chunk.reframe(""), "\n\n\n");
    }

    #[test]
    fn split_transform_join_preserves_paragraphs() {
        let page = "Para one is here.\n\nPara two is here.\n\nPara three.";
        let chunks = split(page, 24);
        let outputs: Vec<String> = chunks
            .iter()
            .map(|c| c.reframe(&c.payload().to_uppercase()))
            .collect();
        assert_eq!(
            join(&outputs),
            "PARA ONE IS HERE.\n\nPARA TWO IS HERE.\n\nPARA THREE."
        );
    }
}
