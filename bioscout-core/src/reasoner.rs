//! Reasoning-gateway abstraction.
//!
//! Defines the [`Reasoner`] trait for model-agnostic "ask a language model to
//! produce text or JSON given a role instruction and a context document"
//! calls, plus the validation helpers callers use on structured output.
//!
//! The gateway is untrusted: when `structured` output is requested, the
//! returned text may still be malformed, so every caller pairs the call with
//! a deterministic fallback. Helpers here only strip fencing and do shallow
//! shape checks; they never guarantee a schema.

use crate::error::ReasonerError;
use crate::prompts::AgentRole;
use async_trait::async_trait;

/// Trait for reasoning gateways.
///
/// `role` selects the instruction text (resolved by the implementation,
/// typically from a [`crate::prompts::PromptLibrary`]); `context` is the
/// document the role reasons over; `structured` requests machine-parseable
/// JSON output rather than free text.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn reason(
        &self,
        role: AgentRole,
        context: &str,
        structured: bool,
    ) -> Result<String, ReasonerError>;
}

/// Strip a markdown code fence from a structured response, if present.
///
/// Gateways often wrap JSON in ```json ... ``` fences even when structured
/// output was requested. Only a fence spanning the whole response is
/// stripped; inner fences are left alone.
pub fn strip_json_fences(response: &str) -> &str {
    let trimmed = response.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let Some(first_newline) = trimmed.find('\n') else {
        return trimmed;
    };
    let body = &trimmed[first_newline + 1..];
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Parse a structured response into JSON after fence stripping.
///
/// Returns `None` on any parse failure; callers log a warning and take their
/// deterministic fallback.
pub fn parse_structured(response: &str) -> Option<serde_json::Value> {
    serde_json::from_str(strip_json_fences(response)).ok()
}

/// A mock reasoner for testing and development.
///
/// Returns queued responses in FIFO order; once the queue is empty, every
/// call fails when constructed with [`MockReasoner::failing`], or returns a
/// canned line otherwise.
pub struct MockReasoner {
    responses: std::sync::Mutex<Vec<String>>,
    fail_when_empty: bool,
}

impl MockReasoner {
    pub fn new() -> Self {
        Self {
            responses: std::sync::Mutex::new(Vec::new()),
            fail_when_empty: false,
        }
    }

    /// Create a mock that always returns the given text.
    ///
    /// Queues multiple copies so it can serve repeated calls.
    pub fn with_response(text: &str) -> Self {
        let mock = Self::new();
        for _ in 0..32 {
            mock.queue_response(text);
        }
        mock
    }

    /// Create a mock whose every call fails with a gateway error.
    pub fn failing() -> Self {
        Self {
            responses: std::sync::Mutex::new(Vec::new()),
            fail_when_empty: true,
        }
    }

    /// Queue a response to be returned by the next `reason` call.
    pub fn queue_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push(text.into());
    }

    /// Number of responses still queued.
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

impl Default for MockReasoner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reasoner for MockReasoner {
    async fn reason(
        &self,
        role: AgentRole,
        _context: &str,
        _structured: bool,
    ) -> Result<String, ReasonerError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            if self.fail_when_empty {
                return Err(ReasonerError::Request {
                    message: format!("mock gateway failure for role {role}"),
                });
            }
            return Ok(format!("Mock response from {role}."));
        }
        Ok(responses.remove(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fences_plain() {
        assert_eq!(strip_json_fences("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_json_fences_fenced() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_json_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_json_fences_bare_fence() {
        let fenced = "```\n[1, 2]\n```";
        assert_eq!(strip_json_fences(fenced), "[1, 2]");
    }

    #[test]
    fn test_parse_structured_malformed() {
        assert!(parse_structured("not json at all").is_none());
        assert!(parse_structured("```json\n{broken\n```").is_none());
    }

    #[test]
    fn test_parse_structured_fenced_object() {
        let value = parse_structured("```json\n{\"trial_links\": []}\n```").unwrap();
        assert!(value.get("trial_links").is_some());
    }

    #[tokio::test]
    async fn test_mock_reasoner_fifo() {
        let mock = MockReasoner::new();
        mock.queue_response("first");
        mock.queue_response("second");
        assert_eq!(
            mock.reason(AgentRole::Advocate, "ctx", false).await.unwrap(),
            "first"
        );
        assert_eq!(
            mock.reason(AgentRole::Skeptic, "ctx", false).await.unwrap(),
            "second"
        );
        assert_eq!(mock.remaining(), 0);
    }

    #[tokio::test]
    async fn test_mock_reasoner_failing() {
        let mock = MockReasoner::failing();
        let err = mock.reason(AgentRole::LinkValidator, "ctx", true).await;
        assert!(err.is_err());
    }
}
