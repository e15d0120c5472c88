//! Request-scoped correlation context and deadline.

use std::time::{Duration, Instant};
use uuid::Uuid;

/// Deadline attached to a request. Work past the deadline should stop and
/// surface a timeout.
#[derive(Debug, Clone, Copy)]
pub struct RequestDeadline {
    deadline: Instant,
}

impl RequestDeadline {
    pub fn after(duration: Duration) -> Self {
        Self {
            deadline: Instant::now() + duration,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Correlation context propagated through the plane: an opaque request id
/// plus an optional deadline.
#[derive(Debug, Clone)]
pub struct CorrelationContext {
    pub correlation_id: String,
    pub deadline: Option<RequestDeadline>,
}

impl CorrelationContext {
    /// Fresh root context with a generated correlation id.
    pub fn new_root() -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            deadline: None,
        }
    }

    /// Context continuing an id received from outside (e.g. a header).
    pub fn continued(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, duration: Duration) -> Self {
        self.deadline = Some(RequestDeadline::after(duration));
        self
    }

    pub fn expired(&self) -> bool {
        self.deadline.map(|d| d.expired()).unwrap_or(false)
    }

    /// Span carrying the correlation id, for wrapping request handling.
    pub fn span(&self, name: &'static str) -> tracing::Span {
        tracing::info_span!("request", operation = name, correlation_id = %self.correlation_id)
    }
}
