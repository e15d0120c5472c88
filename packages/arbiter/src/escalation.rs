//! Human approval of escalated arbitration decisions.

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use concord_events::{event_types, DomainEvent, EventBus};
use concord_observability::MetricsRegistry;

use crate::decision::ArbitrationDecision;
use crate::error::ArbiterError;
use crate::repository::{ArbitrationDecisionRepository, ProposalRepository};
use crate::types::ProposalStatus;

/// Approve or reject escalated decisions. The original decision row is
/// reused: only `executed`, `requires_human_approval` and the winner it
/// designates change.
pub struct EscalationApprovalService {
    decisions: Arc<dyn ArbitrationDecisionRepository>,
    proposals: Arc<dyn ProposalRepository>,
    bus: Arc<EventBus>,
    metrics: Arc<MetricsRegistry>,
}

impl EscalationApprovalService {
    pub fn new(
        decisions: Arc<dyn ArbitrationDecisionRepository>,
        proposals: Arc<dyn ProposalRepository>,
        bus: Arc<EventBus>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            decisions,
            proposals,
            bus,
            metrics,
        }
    }

    async fn open_escalation(&self, decision_id: Uuid) -> Result<ArbitrationDecision, ArbiterError> {
        let decision = self
            .decisions
            .get(decision_id)
            .await
            .ok_or(ArbiterError::DecisionNotFound(decision_id))?;
        if !decision.is_open_escalation() {
            return Err(ArbiterError::NotAnOpenEscalation(decision_id));
        }
        Ok(decision)
    }

    /// Approve: the selected proposal (default: highest confidence among
    /// the escalated set) becomes the winner; the rest are suppressed.
    pub async fn approve_escalated_decision(
        &self,
        decision_id: Uuid,
        approved_by: &str,
        selected_proposal_id: Option<Uuid>,
        correlation_id: Option<&str>,
    ) -> Result<ArbitrationDecision, ArbiterError> {
        let mut decision = self.open_escalation(decision_id).await?;

        let escalated: Vec<_> = self
            .proposals
            .list_by_decision(decision_id)
            .await
            .into_iter()
            .filter(|p| p.status == ProposalStatus::Escalated)
            .collect();

        let selected = match selected_proposal_id {
            Some(id) => {
                if !escalated.iter().any(|p| p.id == id) {
                    return Err(ArbiterError::ProposalNotEscalated {
                        decision: decision_id,
                        proposal: id,
                    });
                }
                id
            }
            None => escalated
                .iter()
                .max_by(|a, b| {
                    a.confidence_score
                        .partial_cmp(&b.confidence_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|p| p.id)
                .ok_or(ArbiterError::NoProposals)?,
        };

        decision.executed = true;
        decision.requires_human_approval = false;
        decision.winning_proposal_id = Some(selected);
        decision.suppressed_proposal_ids = escalated
            .iter()
            .filter(|p| p.id != selected)
            .map(|p| p.id)
            .collect();
        self.decisions.save(decision.clone()).await;

        self.proposals
            .update_status(selected, ProposalStatus::Approved, Some(decision_id))
            .await?;
        for proposal in escalated.iter().filter(|p| p.id != selected) {
            self.proposals
                .update_status(proposal.id, ProposalStatus::Suppressed, Some(decision_id))
                .await?;
        }

        self.metrics
            .inc_counter("escalation_decisions_total", &[("action", "approved")]);
        let mut event = DomainEvent::new(
            event_types::ESCALATION_APPROVED,
            "arbitration",
            decision_id.to_string(),
            json!({
                "approved_by": approved_by,
                "selected_proposal_id": selected,
            }),
        );
        if let Some(correlation_id) = correlation_id {
            event = event.with_correlation_id(correlation_id);
        }
        self.bus.dispatch(event).await;

        tracing::info!(
            decision_id = %decision_id,
            approved_by = %approved_by,
            selected = %selected,
            "escalated decision approved"
        );
        Ok(decision)
    }

    /// Reject: every escalated proposal is suppressed; the decision becomes
    /// terminal with no winner.
    pub async fn reject_escalated_decision(
        &self,
        decision_id: Uuid,
        reason: &str,
        rejected_by: Option<&str>,
        correlation_id: Option<&str>,
    ) -> Result<ArbitrationDecision, ArbiterError> {
        let mut decision = self.open_escalation(decision_id).await?;

        let escalated: Vec<_> = self
            .proposals
            .list_by_decision(decision_id)
            .await
            .into_iter()
            .filter(|p| p.status == ProposalStatus::Escalated)
            .collect();

        decision.executed = true;
        decision.requires_human_approval = false;
        decision.suppressed_proposal_ids = escalated.iter().map(|p| p.id).collect();
        self.decisions.save(decision.clone()).await;

        for proposal in &escalated {
            self.proposals
                .update_status(proposal.id, ProposalStatus::Suppressed, Some(decision_id))
                .await?;
        }

        self.metrics
            .inc_counter("escalation_decisions_total", &[("action", "rejected")]);
        let mut event = DomainEvent::new(
            event_types::ESCALATION_REJECTED,
            "arbitration",
            decision_id.to_string(),
            json!({
                "reason": reason,
                "rejected_by": rejected_by,
                "suppressed_proposal_ids": decision.suppressed_proposal_ids,
            }),
        );
        if let Some(correlation_id) = correlation_id {
            event = event.with_correlation_id(correlation_id);
        }
        self.bus.dispatch(event).await;

        tracing::info!(decision_id = %decision_id, reason = %reason, "escalated decision rejected");
        Ok(decision)
    }
}
