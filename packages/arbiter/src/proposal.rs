//! Proposal intake.

use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use concord_events::{event_types, DomainEvent, EventBus};
use concord_observability::MetricsRegistry;
use concord_registry::RiskLevel;

use crate::repository::ProposalRepository;
use crate::types::{AgentActionProposal, TargetRef};

/// Input for a proposal submission.
#[derive(Debug, Clone)]
pub struct ProposalInput {
    pub agent_name: String,
    pub action_type: String,
    pub target: TargetRef,
    pub proposed_value: Value,
    pub confidence_score: f64,
    pub cost_estimate: f64,
    pub risk_level: RiskLevel,
    pub originating_event_id: Option<String>,
    pub suggestion_id: Option<Uuid>,
}

/// Persists pending proposals and announces them.
pub struct AgentProposalService {
    proposals: Arc<dyn ProposalRepository>,
    bus: Arc<EventBus>,
    metrics: Arc<MetricsRegistry>,
}

impl AgentProposalService {
    pub fn new(
        proposals: Arc<dyn ProposalRepository>,
        bus: Arc<EventBus>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            proposals,
            bus,
            metrics,
        }
    }

    pub async fn submit_proposal(&self, input: ProposalInput) -> AgentActionProposal {
        let mut proposal = AgentActionProposal::new(
            input.agent_name,
            input.action_type,
            input.target,
            input.proposed_value,
        )
        .with_confidence(input.confidence_score)
        .with_cost(input.cost_estimate)
        .with_risk(input.risk_level);
        if let Some(event_id) = input.originating_event_id {
            proposal = proposal.with_originating_event(event_id);
        }
        if let Some(suggestion_id) = input.suggestion_id {
            proposal = proposal.with_suggestion(suggestion_id);
        }

        self.proposals.save(proposal.clone()).await;
        self.metrics
            .inc_counter("proposals_submitted_total", &[("agent", &proposal.agent_name)]);

        self.bus
            .dispatch(DomainEvent::new(
                event_types::PROPOSAL_SUBMITTED,
                "proposal",
                proposal.id.to_string(),
                json!({
                    "agent": proposal.agent_name,
                    "action_type": proposal.action_type,
                    "target": proposal.target.target_key(),
                    "confidence": proposal.confidence_score,
                }),
            ))
            .await;

        tracing::debug!(
            agent = %proposal.agent_name,
            proposal_id = %proposal.id,
            target = %proposal.target.target_key(),
            "proposal submitted"
        );
        proposal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryProposalRepository;
    use concord_events::RecordingHandler;
    use serde_json::json;

    #[tokio::test]
    async fn test_submit_persists_and_announces() {
        let repo = Arc::new(InMemoryProposalRepository::new());
        let bus = Arc::new(EventBus::new());
        let recorder = RecordingHandler::new();
        bus.subscribe(event_types::PROPOSAL_SUBMITTED, recorder.clone())
            .await;

        let service =
            AgentProposalService::new(repo.clone(), bus, Arc::new(MetricsRegistry::new()));

        let proposal = service
            .submit_proposal(ProposalInput {
                agent_name: "Coach".to_string(),
                action_type: "preference_change".to_string(),
                target: TargetRef::preference("user-1", "communication.tone"),
                proposed_value: json!("neutral"),
                confidence_score: 0.85,
                cost_estimate: 0.0,
                risk_level: RiskLevel::Low,
                originating_event_id: Some("evt-1".to_string()),
                suggestion_id: None,
            })
            .await;

        assert!(repo.get(proposal.id).await.is_some());
        assert_eq!(recorder.count_of(event_types::PROPOSAL_SUBMITTED), 1);
    }
}
