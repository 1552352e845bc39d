//! Candidate extraction from chunk content.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use factex_core::{FactexError, LlmClient, Result};

use crate::prompts::PromptTemplates;

/// Stateless per-chunk extractor.
///
/// One LLM call per chunk; retry and backoff belong to the coordinator.
pub struct FactExtractor {
    llm: Arc<dyn LlmClient>,
    templates: PromptTemplates,
    timeout: Duration,
}

impl FactExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, templates: PromptTemplates, timeout: Duration) -> Self {
        Self {
            llm,
            templates,
            timeout,
        }
    }

    /// Extract candidate statements from one chunk.
    ///
    /// Zero candidates is a valid outcome, not an error.
    pub async fn extract(&self, chunk_content: &str) -> Result<Vec<String>> {
        let prompt = self.templates.render_extraction(chunk_content);
        let response = self.llm.complete(&prompt, self.timeout).await?;
        let candidates = parse_candidates(&response)?;
        debug!(candidates = candidates.len(), "extraction finished");
        Ok(candidates)
    }
}

/// Pull `<fact>…</fact>` spans out of an extraction response.
///
/// A literal `None` inside the tags is the model's "no facts here" sentinel
/// and is dropped. An opened tag that never closes means the response was
/// truncated or malformed.
pub fn parse_candidates(response: &str) -> Result<Vec<String>> {
    const OPEN: &str = "<fact>";
    const CLOSE: &str = "</fact>";

    let mut candidates = Vec::new();
    let mut rest = response;

    while let Some(open) = rest.find(OPEN) {
        let after = &rest[open + OPEN.len()..];
        let close = after.find(CLOSE).ok_or_else(|| {
            FactexError::extraction_parse("unclosed <fact> tag in extraction response")
        })?;

        let candidate = after[..close].trim();
        if !candidate.is_empty() && !candidate.eq_ignore_ascii_case("none") {
            candidates.push(candidate.to_string());
        }
        rest = &after[close + CLOSE.len()..];
    }

    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_facts() {
        let response = "Here are the facts:\n<fact>ACME shipped 12,345 units in 2023.</fact>\n<fact>ACME employs 250 people.</fact>\n";
        let candidates = parse_candidates(response).unwrap();
        assert_eq!(
            candidates,
            vec![
                "ACME shipped 12,345 units in 2023.".to_string(),
                "ACME employs 250 people.".to_string(),
            ]
        );
    }

    #[test]
    fn no_tags_means_no_candidates() {
        assert!(parse_candidates("The text contains no verifiable facts.").unwrap().is_empty());
    }

    #[test]
    fn none_sentinel_is_dropped() {
        let candidates = parse_candidates("<fact>None</fact>").unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn empty_span_is_dropped() {
        let candidates = parse_candidates("<fact>   </fact>").unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn unclosed_tag_is_a_parse_error() {
        let err = parse_candidates("<fact>dangling statement").unwrap_err();
        assert!(matches!(err, FactexError::ExtractionParse { .. }));
    }

    #[tokio::test]
    async fn extract_calls_llm_with_rendered_prompt() {
        use crate::testing::MockLlm;

        let llm = Arc::new(MockLlm::new().with_response(
            "the chunk body",
            "<fact>a fact with 1 number</fact>",
        ));
        let extractor = FactExtractor::new(
            llm.clone(),
            PromptTemplates::default(),
            Duration::from_secs(60),
        );

        let candidates = extractor.extract("the chunk body").await.unwrap();
        assert_eq!(candidates, vec!["a fact with 1 number".to_string()]);
        assert_eq!(llm.call_count(), 1);
    }
}
