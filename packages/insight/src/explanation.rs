//! Unified explanations, assembled by id lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use concord_adaptation::{AttemptRepository, AttemptResult};
use concord_arbiter::{
    ArbitrationDecision, ArbitrationDecisionRepository, ArbitrationOutcome,
    ArbitrationPolicyRepository, ProposalRepository, ProposalStatus,
};
use concord_governance::{DecisionRecordRepository, ReasoningSource};

#[derive(Debug, Error)]
pub enum InsightError {
    #[error("no decision, attempt or record found for id {0}")]
    NotFound(Uuid),
}

/// One factor that contributed to the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContributingFactor {
    pub name: String,
    pub value: Value,
    pub impact: Option<String>,
}

/// A losing or rejected alternative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativeConsidered {
    pub proposal_id: Uuid,
    pub agent_name: String,
    pub reason: String,
}

/// Human-readable explanation of any decision in the plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub subject_id: Uuid,
    pub summary: String,
    pub contributing_factors: Vec<ContributingFactor>,
    pub policies_involved: Vec<String>,
    pub alternatives_considered: Vec<AlternativeConsidered>,
    pub why_others_lost: Vec<String>,
    pub decision_type: String,
    pub decided_at: DateTime<Utc>,
}

/// Looks an id up across arbitration decisions, adaptation attempts and
/// governance decision records, and explains whichever it finds.
pub struct ExplanationService {
    arbitrations: Arc<dyn ArbitrationDecisionRepository>,
    proposals: Arc<dyn ProposalRepository>,
    policies: Arc<dyn ArbitrationPolicyRepository>,
    attempts: Arc<dyn AttemptRepository>,
    decisions: Arc<dyn DecisionRecordRepository>,
}

impl ExplanationService {
    pub fn new(
        arbitrations: Arc<dyn ArbitrationDecisionRepository>,
        proposals: Arc<dyn ProposalRepository>,
        policies: Arc<dyn ArbitrationPolicyRepository>,
        attempts: Arc<dyn AttemptRepository>,
        decisions: Arc<dyn DecisionRecordRepository>,
    ) -> Self {
        Self {
            arbitrations,
            proposals,
            policies,
            attempts,
            decisions,
        }
    }

    pub async fn explain(&self, id: Uuid) -> Result<Explanation, InsightError> {
        if let Some(decision) = self.arbitrations.get(id).await {
            return Ok(self.explain_arbitration(decision).await);
        }
        if let Some(attempt) = self.attempts.get(id).await {
            return Ok(Self::explain_attempt(attempt));
        }
        if let Some(record) = self.decisions.get(id).await {
            return Ok(Self::explain_decision_record(record));
        }
        Err(InsightError::NotFound(id))
    }

    async fn explain_arbitration(&self, decision: ArbitrationDecision) -> Explanation {
        let policy_name = match self.policies.get(decision.policy_id).await {
            Some(policy) => format!("{:?} policy ({:?} scope)", policy.resolution_strategy, policy.scope),
            None => format!("policy {}", decision.policy_id),
        };

        let contributing_factors = decision
            .decision_factors
            .iter()
            .map(|factor| ContributingFactor {
                name: format!("{} ({})", factor.factor, factor.agent_name),
                value: factor.value.clone(),
                impact: Some(format!("{:?}", factor.impact).to_lowercase()),
            })
            .collect();

        let mut alternatives = Vec::new();
        let mut why_others_lost = Vec::new();
        let linked = self.proposals.list_by_decision(decision.id).await;
        for proposal in &linked {
            match proposal.status {
                ProposalStatus::Suppressed => {
                    let reason = decision
                        .factor_for(proposal.id)
                        .map(|factor| format!("lost on {}: {}", factor.factor, factor.value))
                        .unwrap_or_else(|| "suppressed by arbitration".to_string());
                    why_others_lost.push(format!("{}: {}", proposal.agent_name, reason));
                    alternatives.push(AlternativeConsidered {
                        proposal_id: proposal.id,
                        agent_name: proposal.agent_name.clone(),
                        reason,
                    });
                }
                ProposalStatus::Vetoed => {
                    alternatives.push(AlternativeConsidered {
                        proposal_id: proposal.id,
                        agent_name: proposal.agent_name.clone(),
                        reason: "Vetoed by policy rule".to_string(),
                    });
                }
                _ => {}
            }
        }

        let summary = match decision.outcome {
            ArbitrationOutcome::WinnerSelected | ArbitrationOutcome::NoConflict => {
                let winner = linked
                    .iter()
                    .find(|p| Some(p.id) == decision.winning_proposal_id)
                    .map(|p| p.agent_name.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                format!("{}: {}", winner, decision.reasoning_summary)
            }
            _ => decision.reasoning_summary.clone(),
        };

        Explanation {
            subject_id: decision.id,
            summary,
            contributing_factors,
            policies_involved: vec![policy_name],
            alternatives_considered: alternatives,
            why_others_lost,
            decision_type: "arbitration".to_string(),
            decided_at: decision.created_at,
        }
    }

    fn explain_attempt(attempt: concord_adaptation::AutoAdaptationAttempt) -> Explanation {
        let mut summary = match attempt.result {
            AttemptResult::Applied => format!(
                "auto-applied {}.{} = {}",
                attempt.category, attempt.key, attempt.suggested_value
            ),
            AttemptResult::Blocked => format!(
                "blocked {}.{} change ({})",
                attempt.category,
                attempt.key,
                attempt.block_reason.map(|r| r.as_str()).unwrap_or("unknown")
            ),
            AttemptResult::Skipped => format!(
                "skipped {}.{} change, already at the suggested value",
                attempt.category, attempt.key
            ),
        };
        if attempt.rolled_back {
            summary.push_str(" (since rolled back)");
        }

        let snapshot = &attempt.policy_snapshot;
        let contributing_factors = vec![
            ContributingFactor {
                name: "confidence".to_string(),
                value: serde_json::json!(attempt.confidence),
                impact: None,
            },
            ContributingFactor {
                name: "risk_level".to_string(),
                value: serde_json::json!(attempt.risk_level),
                impact: None,
            },
            ContributingFactor {
                name: "user_opted_in".to_string(),
                value: serde_json::json!(snapshot.user_opted_in),
                impact: None,
            },
            ContributingFactor {
                name: "min_confidence".to_string(),
                value: serde_json::json!(snapshot.min_confidence),
                impact: None,
            },
        ];

        Explanation {
            subject_id: attempt.id,
            summary,
            contributing_factors,
            policies_involved: vec![format!("adaptation policy {}", attempt.policy_id)],
            alternatives_considered: Vec::new(),
            why_others_lost: Vec::new(),
            decision_type: "adaptation".to_string(),
            decided_at: attempt.timestamp,
        }
    }

    fn explain_decision_record(record: concord_governance::DecisionRecord) -> Explanation {
        let mut contributing_factors = vec![ContributingFactor {
            name: "reasoning_source".to_string(),
            value: serde_json::json!(record.reasoning_source),
            impact: None,
        }];
        if let Some(ai) = &record.ai {
            contributing_factors.push(ContributingFactor {
                name: "model".to_string(),
                value: serde_json::json!(ai.model),
                impact: None,
            });
            contributing_factors.push(ContributingFactor {
                name: "ai_confidence".to_string(),
                value: serde_json::json!(ai.confidence),
                impact: None,
            });
        }

        let summary = match record.reasoning_source {
            ReasoningSource::Fallback => format!(
                "{} decided '{}' via rule fallback",
                record.agent_name, record.decision_type
            ),
            source => format!(
                "{} decided '{}' via {:?} reasoning",
                record.agent_name, record.decision_type, source
            ),
        };

        Explanation {
            subject_id: record.id,
            summary,
            contributing_factors,
            policies_involved: Vec::new(),
            alternatives_considered: Vec::new(),
            why_others_lost: Vec::new(),
            decision_type: record.decision_type,
            decided_at: record.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_adaptation::InMemoryAttemptRepository;
    use concord_arbiter::{
        AgentProposalService, ArbitrationPolicy, ArbitrationService, ConflictDetectionService,
        InMemoryArbitrationDecisionRepository, InMemoryArbitrationPolicyRepository,
        InMemoryConflictRepository, InMemoryProposalRepository, PolicyScope, ProposalInput,
        ResolutionStrategy, TargetRef,
    };
    use concord_events::EventBus;
    use concord_governance::{DecisionRecord, InMemoryDecisionRecordRepository};
    use concord_observability::MetricsRegistry;
    use concord_registry::RiskLevel;
    use serde_json::json;

    struct Fixture {
        arbitrations: Arc<InMemoryArbitrationDecisionRepository>,
        proposals: Arc<InMemoryProposalRepository>,
        policies: Arc<InMemoryArbitrationPolicyRepository>,
        attempts: Arc<InMemoryAttemptRepository>,
        decisions: Arc<InMemoryDecisionRecordRepository>,
        service: ExplanationService,
    }

    fn fixture() -> Fixture {
        let arbitrations = Arc::new(InMemoryArbitrationDecisionRepository::new());
        let proposals = Arc::new(InMemoryProposalRepository::new());
        let policies = Arc::new(InMemoryArbitrationPolicyRepository::new());
        let attempts = Arc::new(InMemoryAttemptRepository::new());
        let decisions = Arc::new(InMemoryDecisionRecordRepository::new());
        let service = ExplanationService::new(
            arbitrations.clone(),
            proposals.clone(),
            policies.clone(),
            attempts.clone(),
            decisions.clone(),
        );
        Fixture {
            arbitrations,
            proposals,
            policies,
            attempts,
            decisions,
            service,
        }
    }

    #[tokio::test]
    async fn test_unknown_id_fails() {
        let f = fixture();
        assert!(matches!(
            f.service.explain(Uuid::new_v4()).await,
            Err(InsightError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_explains_decision_record() {
        let f = fixture();
        let record = DecisionRecord::new(
            "Coach",
            "nudge",
            concord_governance::ReasoningSource::Fallback,
            "keep going",
        );
        let id = record.id;
        f.decisions.save(record).await;

        let explanation = f.service.explain(id).await.unwrap();
        assert!(explanation.summary.contains("rule fallback"));
        assert_eq!(explanation.decision_type, "nudge");
    }

    #[tokio::test]
    async fn test_explains_arbitration_with_alternatives() {
        let f = fixture();
        let bus = Arc::new(EventBus::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let conflicts = Arc::new(InMemoryConflictRepository::new());

        f.policies
            .save(
                ArbitrationPolicy::new(PolicyScope::Global, ResolutionStrategy::Priority)
                    .with_priority_order(vec!["Coach", "Planner"])
                    .as_default(),
            )
            .await;

        let submission =
            AgentProposalService::new(f.proposals.clone(), bus.clone(), metrics.clone());
        let detection = ConflictDetectionService::new(
            f.proposals.clone(),
            conflicts.clone(),
            bus.clone(),
            metrics.clone(),
        );
        let arbitration = ArbitrationService::new(
            f.proposals.clone(),
            conflicts,
            f.policies.clone(),
            f.arbitrations.clone(),
            bus,
            metrics,
        );

        let input = |agent: &str, value: serde_json::Value| ProposalInput {
            agent_name: agent.to_string(),
            action_type: "preference_change".to_string(),
            target: TargetRef::preference("user-1", "communication.tone"),
            proposed_value: value,
            confidence_score: 0.8,
            cost_estimate: 0.0,
            risk_level: RiskLevel::Low,
            originating_event_id: None,
            suggestion_id: None,
        };
        submission.submit_proposal(input("Coach", json!("neutral"))).await;
        submission.submit_proposal(input("Planner", json!("direct"))).await;

        let detected = detection.detect_conflicts().await;
        let decision = arbitration
            .resolve_conflict(detected.conflicts[0].id)
            .await
            .unwrap();

        let explanation = f.service.explain(decision.id).await.unwrap();
        assert!(explanation.summary.contains("Coach"));
        assert_eq!(explanation.alternatives_considered.len(), 1);
        assert_eq!(explanation.alternatives_considered[0].agent_name, "Planner");
        assert!(!explanation.why_others_lost.is_empty());
        assert_eq!(explanation.contributing_factors.len(), 2);
    }
}
