//! Circuit breaker around the LLM provider.
//!
//! Consecutive failures inside the failure window open the circuit; after a
//! cooldown one half-open probe is allowed. Success closes the circuit,
//! failure re-opens it.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::llm::{GenerateOptions, LlmClient, LlmError, LlmResponse};
use concord_observability::MetricsRegistry;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Too many failures, rejecting calls
    Open,
    /// Cooldown elapsed, probing with one call
    HalfOpen,
}

impl CircuitState {
    /// Gauge encoding: closed=0, half_open=1, open=2.
    pub fn gauge_value(&self) -> i64 {
        match self {
            Self::Closed => 0,
            Self::HalfOpen => 1,
            Self::Open => 2,
        }
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: u32,
    /// Failures further apart than this do not accumulate
    pub failure_window: Duration,
    /// How long the circuit stays open before a half-open probe
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window: Duration::seconds(60),
            reset_timeout: Duration::seconds(30),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<DateTime<Utc>>,
}

/// Shared circuit breaker.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Should the next call be attempted? Transitions open → half-open when
    /// the cooldown has elapsed.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                if let Some(last) = inner.last_failure {
                    if Utc::now() - last > self.config.reset_timeout {
                        inner.state = CircuitState::HalfOpen;
                        return true;
                    }
                }
                false
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                tracing::info!(circuit = %self.name, "circuit closed, provider recovered");
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let now = Utc::now();

        // Stale failures outside the window do not accumulate.
        if let Some(last) = inner.last_failure {
            if now - last > self.config.failure_window {
                inner.failure_count = 0;
            }
        }
        inner.failure_count += 1;
        inner.last_failure = Some(now);

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    tracing::warn!(circuit = %self.name, "circuit opened, too many failures");
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                tracing::warn!(circuit = %self.name, "circuit reopened, probe failed");
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }
}

/// [`LlmClient`] decorator enforcing the breaker and exporting its state as
/// a gauge.
pub struct GuardedLlmClient {
    inner: Arc<dyn LlmClient>,
    breaker: CircuitBreaker,
    metrics: Arc<MetricsRegistry>,
}

impl GuardedLlmClient {
    pub fn new(
        inner: Arc<dyn LlmClient>,
        config: CircuitBreakerConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new("llm", config),
            metrics,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    fn export_state(&self) {
        self.metrics.set_gauge(
            "circuit_breaker_state",
            &[("service", "llm")],
            self.breaker.state().gauge_value(),
        );
    }
}

#[async_trait]
impl LlmClient for GuardedLlmClient {
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<LlmResponse, LlmError> {
        if !self.breaker.allow() {
            self.export_state();
            self.metrics
                .inc_counter("circuit_breaker_rejections_total", &[("service", "llm")]);
            return Err(LlmError::CircuitOpen);
        }

        let result = self.inner.generate(prompt, opts).await;
        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        self.export_state();
        result
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }
}
