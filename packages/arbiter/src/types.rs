//! Proposal and conflict records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use concord_registry::RiskLevel;

/// What a proposal targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    /// Resource kind (e.g. "preference", "task")
    pub kind: String,
    /// Resource id (e.g. the user id, a task id)
    pub id: String,
    /// Sub-key within the resource, when it has one
    pub key: Option<String>,
}

impl TargetRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// A preference target: `preference:<owner>:<category.key>`.
    pub fn preference(owner: impl Into<String>, dotted_key: impl Into<String>) -> Self {
        Self::new("preference", owner).with_key(dotted_key)
    }

    /// Grouping key used by conflict detection: `kind:id[:key]`.
    pub fn target_key(&self) -> String {
        match &self.key {
            Some(key) => format!("{}:{}:{}", self.kind, self.id, key),
            None => format!("{}:{}", self.kind, self.id),
        }
    }
}

/// Proposal lifecycle. Exactly one transition away from `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Pending,
    Approved,
    Suppressed,
    Vetoed,
    Escalated,
}

/// An agent-originated action request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentActionProposal {
    pub id: Uuid,
    pub agent_name: String,
    /// Action kind (e.g. "preference_change", "reschedule", "message")
    pub action_type: String,
    pub target: TargetRef,
    pub proposed_value: Value,
    pub confidence_score: f64,
    /// Estimated execution cost in USD
    pub cost_estimate: f64,
    pub risk_level: RiskLevel,
    /// Domain event that prompted the proposal
    pub originating_event_id: Option<String>,
    /// Suggestion this proposal carries, when adaptation originated it
    pub suggestion_id: Option<Uuid>,
    pub status: ProposalStatus,
    /// Decision that settled this proposal
    pub decision_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl AgentActionProposal {
    pub fn new(
        agent_name: impl Into<String>,
        action_type: impl Into<String>,
        target: TargetRef,
        proposed_value: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_name: agent_name.into(),
            action_type: action_type.into(),
            target,
            proposed_value,
            confidence_score: 0.5,
            cost_estimate: 0.0,
            risk_level: RiskLevel::Low,
            originating_event_id: None,
            suggestion_id: None,
            status: ProposalStatus::Pending,
            decision_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence_score = confidence;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost_estimate = cost;
        self
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = risk;
        self
    }

    pub fn with_originating_event(mut self, event_id: impl Into<String>) -> Self {
        self.originating_event_id = Some(event_id.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion_id: Uuid) -> Self {
        self.suggestion_id = Some(suggestion_id);
        self
    }
}

/// How a group of proposals conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Same target, same proposed value
    SameTarget,
    /// Same target, differing proposed values
    MutuallyExclusive,
    /// Competing for a bounded resource
    ResourceCompetition,
    /// Executing all would violate an invariant
    InvariantViolation,
}

/// A detected conflict between pending proposals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: Uuid,
    pub proposal_ids: Vec<Uuid>,
    pub conflict_type: ConflictType,
    /// The contested target key
    pub target: String,
    pub description: String,
    pub resolved: bool,
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    pub fn new(
        proposal_ids: Vec<Uuid>,
        conflict_type: ConflictType,
        target: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            proposal_ids,
            conflict_type,
            target: target.into(),
            description: description.into(),
            resolved: false,
            detected_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_target_key_forms() {
        let plain = TargetRef::new("task", "t-1");
        assert_eq!(plain.target_key(), "task:t-1");

        let keyed = TargetRef::preference("user-1", "communication.tone");
        assert_eq!(keyed.target_key(), "preference:user-1:communication.tone");
    }

    #[test]
    fn test_proposal_builder() {
        let proposal = AgentActionProposal::new(
            "Coach",
            "preference_change",
            TargetRef::preference("user-1", "communication.tone"),
            json!("neutral"),
        )
        .with_confidence(0.85)
        .with_risk(RiskLevel::Medium)
        .with_cost(0.02);

        assert_eq!(proposal.status, ProposalStatus::Pending);
        assert_eq!(proposal.confidence_score, 0.85);
        assert_eq!(proposal.risk_level, RiskLevel::Medium);
        assert!(proposal.decision_id.is_none());
    }
}
