//! Injected prompt templates.
//!
//! The pipeline treats prompt wording as configuration: callers may swap
//! either template as long as the response keeps the agreed tag formats —
//! `<fact>…</fact>` spans from the extractor, and a `<reasoning>` block plus
//! `<is_valid>true|false</is_valid>` from the verifier.

/// Placeholder for the chunk text in the extraction template.
pub const TEXT_SLOT: &str = "{text}";

/// Placeholder for the candidate statement in the verification template.
pub const STATEMENT_SLOT: &str = "{statement}";

/// Placeholder for the source context in the verification template.
pub const CONTEXT_SLOT: &str = "{context}";

/// The two templates the pipeline formats.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub extraction: String,
    pub verification: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            extraction: DEFAULT_EXTRACTION.to_string(),
            verification: DEFAULT_VERIFICATION.to_string(),
        }
    }
}

impl PromptTemplates {
    /// Fill the extraction template with a chunk's content.
    pub fn render_extraction(&self, text: &str) -> String {
        self.extraction.replace(TEXT_SLOT, text)
    }

    /// Fill the verification template with a candidate and its context.
    pub fn render_verification(&self, statement: &str, context: &str) -> String {
        self.verification
            .replace(STATEMENT_SLOT, statement)
            .replace(CONTEXT_SLOT, context)
    }
}

const DEFAULT_EXTRACTION: &str = r#"You are a rigorous technical fact extractor. From the text below, extract ONLY clear, verifiable factual statements that contain specific, measurable data points: concrete numbers with units, fully named entities, and complete context, stated directly in the text without inference.

Rules:
- Never combine information from different parts of the text.
- Never infer relationships that are not explicitly stated.
- Preserve all numbers, units, and qualifiers exactly.
- If the text contains no qualifying facts, output nothing.

Wrap each extracted statement in its own tags, one per line:
<fact>statement here</fact>

Text:
{text}"#;

const DEFAULT_VERIFICATION: &str = r#"You are a rigorous fact verifier. Decide whether the submitted statement is a concrete, verifiable fact fully supported by the original text below. Judge ONLY against the original text, never against outside knowledge.

A statement is valid only if every number, entity, and qualifier appears in the original text, nothing is combined from separate contexts, and no inference is required.

Respond in exactly this format:
<reasoning>
brief numbered reasoning
</reasoning>
<is_valid>true or false</is_valid>

Submitted statement:
{statement}

Original text:
{context}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_extraction_substitutes_text() {
        let templates = PromptTemplates::default();
        let prompt = templates.render_extraction("CHUNK BODY");
        assert!(prompt.contains("CHUNK BODY"));
        assert!(!prompt.contains(TEXT_SLOT));
    }

    #[test]
    fn render_verification_substitutes_both() {
        let templates = PromptTemplates::default();
        let prompt = templates.render_verification("THE CLAIM", "THE SOURCE");
        assert!(prompt.contains("THE CLAIM"));
        assert!(prompt.contains("THE SOURCE"));
        assert!(!prompt.contains(STATEMENT_SLOT));
        assert!(!prompt.contains(CONTEXT_SLOT));
    }
}
