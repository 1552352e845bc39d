//! Candidate verification against source context.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use factex_core::{FactexError, LlmClient, Result, VerificationStatus, Verdict};

use crate::prompts::PromptTemplates;

/// Per-candidate verifier.
///
/// The decision must be attributable to the supplied context, never to
/// world knowledge; the template instructs the model accordingly and the
/// parser only trusts the tagged decision.
pub struct FactVerifier {
    llm: Arc<dyn LlmClient>,
    templates: PromptTemplates,
    timeout: Duration,
}

impl FactVerifier {
    pub fn new(llm: Arc<dyn LlmClient>, templates: PromptTemplates, timeout: Duration) -> Self {
        Self {
            llm,
            templates,
            timeout,
        }
    }

    /// Decide whether `statement` is supported by `original_text`.
    pub async fn verify(&self, statement: &str, original_text: &str) -> Result<Verdict> {
        let prompt = self.templates.render_verification(statement, original_text);
        let response = self.llm.complete(&prompt, self.timeout).await?;
        let verdict = parse_verdict(&response)?;
        debug!(status = %verdict.status, "verification finished");
        Ok(verdict)
    }
}

fn extract_tag<'a>(response: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = response.find(&open)? + open.len();
    let end = response[start..].find(&close)? + start;
    Some(response[start..end].trim())
}

/// Parse the `<reasoning>` / `<is_valid>` response shape into a verdict.
pub fn parse_verdict(response: &str) -> Result<Verdict> {
    let decision = extract_tag(response, "is_valid").ok_or_else(|| {
        FactexError::verification_parse("missing <is_valid> tag in verification response")
    })?;

    let status = match decision.to_ascii_lowercase().as_str() {
        "true" => VerificationStatus::Verified,
        "false" => VerificationStatus::Rejected,
        other => {
            return Err(FactexError::verification_parse(format!(
                "unexpected <is_valid> value: {:?}",
                other
            )))
        }
    };

    let reason = extract_tag(response, "reasoning").unwrap_or("").to_string();

    Ok(Verdict { status, reason })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_verdict() {
        let response = "<reasoning>\n1. All numbers appear in the text\n</reasoning>\n<is_valid>true</is_valid>";
        let verdict = parse_verdict(response).unwrap();
        assert_eq!(verdict.status, VerificationStatus::Verified);
        assert!(verdict.reason.contains("numbers appear"));
    }

    #[test]
    fn parses_rejection() {
        let response = "<reasoning>combines separate sentences</reasoning><is_valid>false</is_valid>";
        let verdict = parse_verdict(response).unwrap();
        assert_eq!(verdict.status, VerificationStatus::Rejected);
    }

    #[test]
    fn missing_decision_is_a_parse_error() {
        let err = parse_verdict("<reasoning>thinking...</reasoning>").unwrap_err();
        assert!(matches!(err, FactexError::VerificationParse { .. }));
    }

    #[test]
    fn garbled_decision_is_a_parse_error() {
        let err = parse_verdict("<is_valid>maybe</is_valid>").unwrap_err();
        assert!(matches!(err, FactexError::VerificationParse { .. }));
    }

    #[test]
    fn missing_reasoning_is_tolerated() {
        let verdict = parse_verdict("<is_valid>true</is_valid>").unwrap();
        assert!(verdict.reason.is_empty());
    }

    #[tokio::test]
    async fn verify_round_trip() {
        use crate::testing::MockLlm;

        let llm = Arc::new(MockLlm::new().with_response(
            "the candidate",
            "<reasoning>directly stated</reasoning><is_valid>true</is_valid>",
        ));
        let verifier = FactVerifier::new(
            llm,
            PromptTemplates::default(),
            Duration::from_secs(60),
        );

        let verdict = verifier.verify("the candidate", "the source text").await.unwrap();
        assert_eq!(verdict.status, VerificationStatus::Verified);
        assert_eq!(verdict.reason, "directly stated");
    }
}
