//! System prompts for LLM-based translation.
//!
//! Every prompt lives here so the default behaviour can be changed in one
//! place and inspected by unit tests without a live provider.
//!
//! Callers can override the default via
//! [`crate::config::PipelineConfig::system_prompt`]; the template here is used
//! only when no override is provided.

/// Default translation prompt. `{target_language}` is substituted at build time.
pub const TRANSLATION_PROMPT_TEMPLATE: &str = r#"You are a professional translator. Translate the text the user sends into {target_language}.

Follow these rules precisely:

1. CONTENT
   - Translate ALL of the text; do not summarise, skip, or add sentences
   - Keep names, numbers, URLs, and code exactly as written
   - If a passage is already in {target_language}, return it unchanged

2. STRUCTURE
   - Preserve paragraph breaks and line breaks exactly
   - Preserve list markers, headings, and punctuation

3. OUTPUT FORMAT
   - Output ONLY the translation
   - Do NOT add notes, explanations, or a preamble such as "Here is the translation"
   - Do NOT wrap the output in quotes or code fences"#;

/// Build the system prompt for `target_language`.
pub fn translation_system_prompt(target_language: &str) -> String {
    TRANSLATION_PROMPT_TEMPLATE.replace("{target_language}", target_language.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_target_language() {
        let p = translation_system_prompt(" Hinglish ");
        assert!(p.contains("into Hinglish."));
        assert!(!p.contains("{target_language}"));
    }

    #[test]
    fn prompt_forbids_preamble() {
        let p = translation_system_prompt("French");
        assert!(p.contains("Output ONLY the translation"));
    }
}
