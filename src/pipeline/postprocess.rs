//! Post-processing: deterministic cleanup of LLM translation output.
//!
//! Even with a strict prompt, chat models sometimes wrap the answer in code
//! fences, open with "Here is the translation:", or leak zero-width
//! characters. These rules strip such artefacts without touching the
//! translated content. They run only on the LLM backend's output; the
//! Google backend returns plain text.
//!
//! ## Rule Order
//!
//! Line endings are normalised first so the fence and preamble patterns only
//! need to match `\n`.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to a raw model answer.
///
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip outer code fences
/// 3. Drop a leading "Here is the translation:" style preamble
/// 4. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 5. Trim surrounding whitespace
pub fn clean_translation(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = strip_outer_fences(&s);
    let s = strip_preamble(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip outer fences ───────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n```\s*$").unwrap());

fn strip_outer_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 3: Drop preamble ────────────────────────────────────────────────────

static RE_PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:sure[,!.]?\s*)?(?:here is|here's) (?:the|your) (?:\w+ )?translation[^\n]*:\s*\n").unwrap()
});

fn strip_preamble(input: &str) -> String {
    RE_PREAMBLE.replace(input, "").to_string()
}

// ── Rule 4: Strip invisible characters ───────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_strip_fences_with_lang() {
        assert_eq!(strip_outer_fences("```text\nnamaste\n```"), "namaste");
    }

    #[test]
    fn test_no_fences_passthrough() {
        assert_eq!(strip_outer_fences("namaste"), "namaste");
    }

    #[test]
    fn test_strip_preamble() {
        let input = "Here is the Hinglish translation:\naap kaise ho?";
        assert_eq!(strip_preamble(input), "aap kaise ho?");
    }

    #[test]
    fn test_preamble_in_body_is_kept() {
        let input = "pehla vakya.\nHere is the translation:\nmore";
        assert_eq!(strip_preamble(input), input);
    }

    #[test]
    fn test_remove_invisible() {
        assert_eq!(remove_invisible_chars("ek\u{200B}do\u{FEFF}"), "ekdo");
    }

    #[test]
    fn test_clean_translation_full_pipeline() {
        let input = "```\r\nSure! Here's your translation:\r\naap kya kar rahe ho?\u{200B}\r\n```";
        assert_eq!(clean_translation(input), "aap kya kar rahe ho?");
    }

    #[test]
    fn test_keeps_inner_paragraphs() {
        assert_eq!(clean_translation("ek.\n\ndo."), "ek.\n\ndo.");
    }
}
