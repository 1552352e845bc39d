//! Mock LLM for testing pipeline logic without real provider calls.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use factex_core::{LlmClient, LlmError};

struct Rule {
    needle: String,
    response: String,
}

/// A scripted LLM.
///
/// Responds to the first rule whose needle appears in the prompt; injected
/// failures are consumed first, in order, regardless of the prompt. Calls
/// are recorded for assertions.
#[derive(Default)]
pub struct MockLlm {
    rules: Mutex<Vec<Rule>>,
    failures: Mutex<VecDeque<LlmError>>,
    calls: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Respond with `response` whenever the prompt contains `needle`.
    pub fn with_response(self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            needle: needle.into(),
            response: response.into(),
        });
        self
    }

    /// Fail the next call with `error` (before any rule matching).
    pub fn with_failure(self, error: LlmError) -> Self {
        self.failures.lock().unwrap().push_back(error);
        self
    }

    /// Fail the next `n` calls with clones of `error`.
    pub fn with_failures(self, n: usize, error: LlmError) -> Self {
        {
            let mut failures = self.failures.lock().unwrap();
            for _ in 0..n {
                failures.push_back(error.clone());
            }
        }
        self
    }

    /// Prompts received so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(
        &self,
        prompt: &str,
        _timeout: Duration,
    ) -> std::result::Result<String, LlmError> {
        self.calls.lock().unwrap().push(prompt.to_string());

        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let rules = self.rules.lock().unwrap();
        for rule in rules.iter() {
            if prompt.contains(&rule.needle) {
                return Ok(rule.response.clone());
            }
        }
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rules_match_on_substring() {
        let llm = MockLlm::new()
            .with_response("alpha", "A")
            .with_response("beta", "B");

        assert_eq!(llm.complete("contains alpha here", Duration::ZERO).await.unwrap(), "A");
        assert_eq!(llm.complete("and beta there", Duration::ZERO).await.unwrap(), "B");
        assert_eq!(llm.complete("neither", Duration::ZERO).await.unwrap(), "");
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn failures_drain_first() {
        let llm = MockLlm::new()
            .with_failures(2, LlmError::RateLimited)
            .with_response("x", "ok");

        assert_eq!(llm.complete("x", Duration::ZERO).await, Err(LlmError::RateLimited));
        assert_eq!(llm.complete("x", Duration::ZERO).await, Err(LlmError::RateLimited));
        assert_eq!(llm.complete("x", Duration::ZERO).await.unwrap(), "ok");
    }
}
