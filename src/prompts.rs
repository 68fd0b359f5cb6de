//! Instruction prompts for caption recognition.
//!
//! Callers can override the default via
//! [`crate::config::ExtractionConfig::system_prompt`]; the constant here is
//! used only when no override is provided. The response parser in
//! [`crate::pipeline::recognize`] expects the two labelled lines this prompt
//! asks for, but tolerates their absence.

/// Default system prompt for reading one caption crop.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are reading a single caption block cropped from a scanned plant field guide page.

Follow these rules precisely:

1. OUTPUT FORMAT
   - First line: "Name: " followed by the plant name exactly as printed in the caption heading
   - Second line: "Description: " followed by the complete caption text, line breaks preserved
   - Output nothing else: no Markdown, no code fences, no commentary

2. TEXT PRESERVATION
   - Transcribe characters exactly as printed, including kana, kanji and Latin names
   - Maintain reading order as a human would read the caption
   - Do not translate, summarise or correct the text

3. UNREADABLE INPUT
   - If the name cannot be read, write "Name: unknown"
   - If no text can be read at all, write "Description:" with nothing after it"#;

/// Label the parser recognises for the name line, in the languages the
/// field guides are printed in.
pub const NAME_LABELS: &[&str] = &["Name", "植物名"];

/// Label the parser recognises for the description block.
pub const DESCRIPTION_LABELS: &[&str] = &["Description", "説明文"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_mentions_every_english_label() {
        for label in NAME_LABELS.iter().chain(DESCRIPTION_LABELS).filter(|l| l.is_ascii()) {
            assert!(
                DEFAULT_SYSTEM_PROMPT.contains(&format!("{label}:")),
                "prompt lacks {label}"
            );
        }
    }
}
