//! Conflict detection over pending proposals.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use concord_events::{event_types, DomainEvent, EventBus};
use concord_observability::MetricsRegistry;

use crate::repository::{ConflictRepository, ProposalRepository};
use crate::types::{AgentActionProposal, Conflict, ConflictType};

/// What one detection pass found.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub conflicts: Vec<Conflict>,
    /// Pending proposals whose target nobody else contested
    pub unconflicted: Vec<AgentActionProposal>,
}

/// Groups pending proposals by target and opens conflicts for contested
/// targets.
pub struct ConflictDetectionService {
    proposals: Arc<dyn ProposalRepository>,
    conflicts: Arc<dyn ConflictRepository>,
    bus: Arc<EventBus>,
    metrics: Arc<MetricsRegistry>,
}

impl ConflictDetectionService {
    pub fn new(
        proposals: Arc<dyn ProposalRepository>,
        conflicts: Arc<dyn ConflictRepository>,
        bus: Arc<EventBus>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            proposals,
            conflicts,
            bus,
            metrics,
        }
    }

    /// One detection pass over all pending proposals.
    pub async fn detect_conflicts(&self) -> DetectionResult {
        let pending = self.proposals.list_pending().await;

        let mut groups: HashMap<String, Vec<AgentActionProposal>> = HashMap::new();
        for proposal in pending {
            groups
                .entry(proposal.target.target_key())
                .or_default()
                .push(proposal);
        }

        let mut conflicts = Vec::new();
        let mut unconflicted = Vec::new();

        for (target, group) in groups {
            if group.len() < 2 {
                unconflicted.extend(group);
                continue;
            }

            // Values compare structurally: object key order and whitespace
            // never make two equal values "different".
            let first_value = &group[0].proposed_value;
            let conflict_type = if group.iter().any(|p| p.proposed_value != *first_value) {
                ConflictType::MutuallyExclusive
            } else {
                ConflictType::SameTarget
            };

            let agents: Vec<&str> = group.iter().map(|p| p.agent_name.as_str()).collect();
            let conflict = Conflict::new(
                group.iter().map(|p| p.id).collect(),
                conflict_type,
                target.clone(),
                format!(
                    "{} proposals from [{}] target {}",
                    group.len(),
                    agents.join(", "),
                    target
                ),
            );

            self.conflicts.save(conflict.clone()).await;
            self.metrics.inc_counter(
                "conflicts_detected_total",
                &[("type", match conflict_type {
                    ConflictType::SameTarget => "same_target",
                    ConflictType::MutuallyExclusive => "mutually_exclusive",
                    ConflictType::ResourceCompetition => "resource_competition",
                    ConflictType::InvariantViolation => "invariant_violation",
                })],
            );

            self.bus
                .dispatch(DomainEvent::new(
                    event_types::CONFLICT_DETECTED,
                    "conflict",
                    conflict.id.to_string(),
                    json!({
                        "target": conflict.target,
                        "conflict_type": conflict.conflict_type,
                        "proposal_ids": conflict.proposal_ids,
                    }),
                ))
                .await;

            tracing::info!(
                conflict_id = %conflict.id,
                target = %conflict.target,
                proposals = conflict.proposal_ids.len(),
                "conflict detected"
            );
            conflicts.push(conflict);
        }

        DetectionResult {
            conflicts,
            unconflicted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryConflictRepository, InMemoryProposalRepository};
    use crate::types::TargetRef;
    use concord_events::RecordingHandler;
    use serde_json::json;

    struct Fixture {
        proposals: Arc<InMemoryProposalRepository>,
        service: ConflictDetectionService,
        recorder: Arc<RecordingHandler>,
    }

    async fn fixture() -> Fixture {
        let proposals = Arc::new(InMemoryProposalRepository::new());
        let conflicts = Arc::new(InMemoryConflictRepository::new());
        let bus = Arc::new(EventBus::new());
        let recorder = RecordingHandler::new();
        bus.subscribe(event_types::CONFLICT_DETECTED, recorder.clone())
            .await;
        let service = ConflictDetectionService::new(
            proposals.clone(),
            conflicts,
            bus,
            Arc::new(MetricsRegistry::new()),
        );
        Fixture {
            proposals,
            service,
            recorder,
        }
    }

    fn tone_proposal(agent: &str, value: serde_json::Value) -> AgentActionProposal {
        AgentActionProposal::new(
            agent,
            "preference_change",
            TargetRef::preference("user-1", "communication.tone"),
            value,
        )
    }

    #[tokio::test]
    async fn test_single_proposal_is_unconflicted() {
        let f = fixture().await;
        f.proposals.save(tone_proposal("Coach", json!("neutral"))).await;

        let result = f.service.detect_conflicts().await;
        assert!(result.conflicts.is_empty());
        assert_eq!(result.unconflicted.len(), 1);
        assert_eq!(f.recorder.count_of(event_types::CONFLICT_DETECTED), 0);
    }

    #[tokio::test]
    async fn test_differing_values_are_mutually_exclusive() {
        let f = fixture().await;
        f.proposals.save(tone_proposal("Coach", json!("neutral"))).await;
        f.proposals.save(tone_proposal("Planner", json!("direct"))).await;

        let result = f.service.detect_conflicts().await;
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(
            result.conflicts[0].conflict_type,
            ConflictType::MutuallyExclusive
        );
        assert_eq!(f.recorder.count_of(event_types::CONFLICT_DETECTED), 1);
    }

    #[tokio::test]
    async fn test_equal_values_are_same_target() {
        let f = fixture().await;
        f.proposals.save(tone_proposal("Coach", json!("neutral"))).await;
        f.proposals.save(tone_proposal("Planner", json!("neutral"))).await;

        let result = f.service.detect_conflicts().await;
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::SameTarget);
    }

    #[tokio::test]
    async fn test_structurally_equal_objects_are_same_target() {
        let f = fixture().await;
        // Key order differs; the values are structurally identical.
        f.proposals
            .save(tone_proposal("Coach", json!({"a": 1, "b": 2})))
            .await;
        f.proposals
            .save(tone_proposal("Planner", json!({"b": 2, "a": 1})))
            .await;

        let result = f.service.detect_conflicts().await;
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::SameTarget);
    }

    #[tokio::test]
    async fn test_distinct_targets_do_not_conflict() {
        let f = fixture().await;
        f.proposals.save(tone_proposal("Coach", json!("neutral"))).await;
        f.proposals
            .save(AgentActionProposal::new(
                "Planner",
                "preference_change",
                TargetRef::preference("user-1", "scheduling.reminder_lead_minutes"),
                json!(45),
            ))
            .await;

        let result = f.service.detect_conflicts().await;
        assert!(result.conflicts.is_empty());
        assert_eq!(result.unconflicted.len(), 2);
    }
}
