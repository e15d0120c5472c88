//! The domain event envelope and the closed set of event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Event types emitted by the decision plane.
pub mod event_types {
    pub const PROPOSAL_SUBMITTED: &str = "proposal.submitted";
    pub const CONFLICT_DETECTED: &str = "conflict.detected";
    pub const ARBITRATION_RESOLVED: &str = "arbitration.resolved";
    pub const ARBITRATION_ESCALATED: &str = "arbitration.escalated";
    pub const ACTION_SUPPRESSED: &str = "action.suppressed";
    pub const PREFERENCE_AUTO_APPLIED: &str = "preference.auto_applied";
    pub const PREFERENCE_AUTO_BLOCKED: &str = "preference.auto_blocked";
    pub const PREFERENCE_AUTO_SKIPPED: &str = "preference.auto_skipped";
    pub const PREFERENCE_ROLLED_BACK: &str = "preference.rolled_back";
    pub const SUGGESTION_APPROVED: &str = "suggestion.approved";
    pub const SUGGESTION_REJECTED: &str = "suggestion.rejected";
    pub const ESCALATION_APPROVED: &str = "escalation.approved";
    pub const ESCALATION_REJECTED: &str = "escalation.rejected";
}

/// A domain event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Event ID
    pub id: Uuid,
    /// Event type (see [`event_types`])
    pub event_type: String,
    /// Aggregate kind this event concerns (e.g. "proposal", "preference")
    pub aggregate_type: String,
    /// Aggregate identifier
    pub aggregate_id: String,
    /// Event payload
    pub payload: Value,
    /// Request correlation id, when the event originated inside a request
    pub correlation_id: Option<String>,
    /// When the event occurred
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(
        event_type: impl Into<String>,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            payload,
            correlation_id: None,
            occurred_at: Utc::now(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_construction() {
        let event = DomainEvent::new(
            event_types::PROPOSAL_SUBMITTED,
            "proposal",
            "p-1",
            json!({"agent": "Coach"}),
        )
        .with_correlation_id("corr-1");

        assert_eq!(event.event_type, "proposal.submitted");
        assert_eq!(event.aggregate_id, "p-1");
        assert_eq!(event.correlation_id.as_deref(), Some("corr-1"));
    }
}
