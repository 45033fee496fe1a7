//! Document source: the ordered page texts a job translates.
//!
//! Format parsing (PDF, EPUB, …) happens outside this crate. Whatever does
//! the parsing hands the pipeline something implementing [`Document`], which
//! must return the same text for a page on every call; resume relies on it.

use crate::error::PipelineError;

/// An ordered, immutable sequence of page texts.
pub trait Document: Send + Sync {
    /// Number of pages.
    fn page_count(&self) -> usize;

    /// Text of page `page_num` (1-indexed).
    fn page_text(&self, page_num: usize) -> Result<String, PipelineError>;
}

/// In-memory document backed by a `Vec<String>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    pages: Vec<String>,
}

impl TextDocument {
    pub fn from_pages<I, S>(pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pages: pages.into_iter().map(Into::into).collect(),
        }
    }

    /// Split plain text into pages on form feeds (`\x0c`).
    ///
    /// Text without form feeds becomes a single page. A trailing form feed
    /// does not create an empty last page.
    pub fn from_form_feeds(text: &str) -> Self {
        let trimmed = text.strip_suffix('\u{c}').unwrap_or(text);
        if trimmed.is_empty() {
            return Self { pages: Vec::new() };
        }
        Self::from_pages(trimmed.split('\u{c}'))
    }

    /// Split plain text into pages of `lines_per_page` lines each.
    pub fn from_lines(text: &str, lines_per_page: usize) -> Self {
        let per_page = lines_per_page.max(1);
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        Self::from_pages(lines.chunks(per_page).map(|c| c.concat()))
    }

    pub fn pages(&self) -> &[String] {
        &self.pages
    }
}

impl Document for TextDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, page_num: usize) -> Result<String, PipelineError> {
        page_num
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .cloned()
            .ok_or_else(|| PipelineError::InvalidInput {
                reason: format!(
                    "page {} is out of range (document has {} pages)",
                    page_num,
                    self.pages.len()
                ),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_one_indexed() {
        let doc = TextDocument::from_pages(["a", "b"]);
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.page_text(1).unwrap(), "a");
        assert_eq!(doc.page_text(2).unwrap(), "b");
    }

    #[test]
    fn out_of_range_page_is_invalid_input() {
        let doc = TextDocument::from_pages(["a"]);
        assert!(matches!(
            doc.page_text(0),
            Err(PipelineError::InvalidInput { .. })
        ));
        assert!(matches!(
            doc.page_text(2),
            Err(PipelineError::InvalidInput { .. })
        ));
    }

    #[test]
    fn form_feed_split() {
        let doc = TextDocument::from_form_feeds("one\u{c}two\u{c}three\u{c}");
        assert_eq!(doc.pages(), &["one", "two", "three"]);
    }

    #[test]
    fn empty_text_has_no_pages() {
        assert_eq!(TextDocument::from_form_feeds("").page_count(), 0);
        assert_eq!(TextDocument::from_lines("", 10).page_count(), 0);
    }

    #[test]
    fn line_split_is_lossless() {
        let text = "l1\nl2\nl3\nl4\nl5";
        let doc = TextDocument::from_lines(text, 2);
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.pages().concat(), text);
        assert_eq!(doc.page_text(3).unwrap(), "l5");
    }
}
