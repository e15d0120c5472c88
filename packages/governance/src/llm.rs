//! The LLM port: what the plane needs from a language-model provider.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use thiserror::Error;

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
    pub total: u32,
}

/// A completed generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Generated content
    pub content: String,
    /// Provider-reported confidence in [0, 1]
    pub confidence: f64,
    /// Wall-clock latency of the call
    pub latency_ms: u64,
    /// Estimated cost in USD
    pub cost_usd: f64,
    /// Model identifier
    pub model: String,
    /// Token usage
    pub tokens: TokenUsage,
}

/// Options for a generation call.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub model: Option<String>,
}

/// Failures surfaced by the LLM port. No partial results.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),

    #[error("LLM call timed out after {0} ms")]
    Timeout(u64),

    #[error("AI circuit is open")]
    CircuitOpen,

    #[error("LLM returned malformed output: {0}")]
    Malformed(String),
}

/// Port to the language-model provider.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<LlmResponse, LlmError>;

    async fn health_check(&self) -> bool;
}

/// Scripted client for tests and the dev server. Queued results are
/// returned in order; with an empty queue it answers deterministically.
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    default_confidence: f64,
    calls: Mutex<Vec<String>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_confidence: 0.9,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default_confidence(mut self, confidence: f64) -> Self {
        self.default_confidence = confidence;
        self
    }

    /// Queue a successful response.
    pub fn enqueue_response(&self, content: impl Into<String>, confidence: f64) {
        self.script.lock().push_back(Ok(Self::response(content, confidence)));
    }

    /// Queue a failure.
    pub fn enqueue_error(&self, error: LlmError) {
        self.script.lock().push_back(Err(error));
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn response(content: impl Into<String>, confidence: f64) -> LlmResponse {
        let content = content.into();
        let completion = content.split_whitespace().count() as u32;
        LlmResponse {
            content,
            confidence,
            latency_ms: 12,
            cost_usd: 0.0004,
            model: "mock-1".to_string(),
            tokens: TokenUsage {
                prompt: 50,
                completion,
                total: 50 + completion,
            },
        }
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, prompt: &str, _opts: &GenerateOptions) -> Result<LlmResponse, LlmError> {
        self.calls.lock().push(prompt.to_string());
        if let Some(scripted) = self.script.lock().pop_front() {
            return scripted;
        }
        Ok(Self::response("ok", self.default_confidence))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_scripted_results_in_order() {
        let mock = MockLlmClient::new();
        mock.enqueue_response("first", 0.8);
        mock.enqueue_error(LlmError::Unavailable("down".into()));

        let first = mock.generate("p1", &GenerateOptions::default()).await.unwrap();
        assert_eq!(first.content, "first");

        let second = mock.generate("p2", &GenerateOptions::default()).await;
        assert!(matches!(second, Err(LlmError::Unavailable(_))));

        assert_eq!(mock.prompts(), vec!["p1".to_string(), "p2".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_default_response() {
        let mock = MockLlmClient::new().with_default_confidence(0.5);
        let response = mock.generate("p", &GenerateOptions::default()).await.unwrap();
        assert_eq!(response.confidence, 0.5);
        assert!(response.tokens.total > 0);
    }
}
