//! End-to-end arbitration flows: submission, detection, resolution,
//! escalation approval.

use std::sync::Arc;

use serde_json::json;

use concord_arbiter::{
    AgentProposalService, ArbitrationDecisionRepository, ArbitrationOutcome, ArbitrationPolicy,
    ArbitrationPolicyRepository, ArbitrationService, ConflictDetectionService,
    EscalationApprovalService, EscalationRule, InMemoryArbitrationDecisionRepository,
    InMemoryArbitrationPolicyRepository, InMemoryConflictRepository, InMemoryProposalRepository,
    PolicyScope, ProposalInput, ProposalRepository, ProposalStatus, ResolutionStrategy, TargetRef,
    VetoCondition, VetoRule,
};
use concord_events::{event_types, EventBus, RecordingHandler};
use concord_observability::MetricsRegistry;
use concord_registry::RiskLevel;

struct Plane {
    proposals: Arc<InMemoryProposalRepository>,
    policies: Arc<InMemoryArbitrationPolicyRepository>,
    decisions: Arc<InMemoryArbitrationDecisionRepository>,
    submission: AgentProposalService,
    detection: ConflictDetectionService,
    arbitration: ArbitrationService,
    escalation: EscalationApprovalService,
    recorder: Arc<RecordingHandler>,
}

async fn plane() -> Plane {
    let proposals = Arc::new(InMemoryProposalRepository::new());
    let conflicts = Arc::new(InMemoryConflictRepository::new());
    let policies = Arc::new(InMemoryArbitrationPolicyRepository::new());
    let decisions = Arc::new(InMemoryArbitrationDecisionRepository::new());
    let bus = Arc::new(EventBus::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let recorder = RecordingHandler::new();
    bus.subscribe_all(recorder.clone()).await;

    Plane {
        proposals: proposals.clone(),
        policies: policies.clone(),
        decisions: decisions.clone(),
        submission: AgentProposalService::new(proposals.clone(), bus.clone(), metrics.clone()),
        detection: ConflictDetectionService::new(
            proposals.clone(),
            conflicts.clone(),
            bus.clone(),
            metrics.clone(),
        ),
        arbitration: ArbitrationService::new(
            proposals.clone(),
            conflicts,
            policies,
            decisions.clone(),
            bus.clone(),
            metrics.clone(),
        ),
        escalation: EscalationApprovalService::new(decisions, proposals, bus, metrics),
        recorder,
    }
}

fn tone_input(agent: &str, value: serde_json::Value, confidence: f64) -> ProposalInput {
    ProposalInput {
        agent_name: agent.to_string(),
        action_type: "preference_change".to_string(),
        target: TargetRef::preference("user-1", "communication.tone"),
        proposed_value: value,
        confidence_score: confidence,
        cost_estimate: 0.0,
        risk_level: RiskLevel::Low,
        originating_event_id: None,
        suggestion_id: None,
    }
}

#[tokio::test]
async fn priority_strategy_selects_by_order_not_confidence() {
    let p = plane().await;
    p.policies
        .save(
            ArbitrationPolicy::new(PolicyScope::Global, ResolutionStrategy::Priority)
                .with_priority_order(vec!["Coach", "Planner", "Logger"])
                .as_default(),
        )
        .await;

    let coach = p
        .submission
        .submit_proposal(tone_input("Coach", json!("encouraging"), 0.85))
        .await;
    let planner = p
        .submission
        .submit_proposal(tone_input("Planner", json!("direct"), 0.90))
        .await;

    let detected = p.detection.detect_conflicts().await;
    assert_eq!(detected.conflicts.len(), 1);

    let decision = p
        .arbitration
        .resolve_conflict(detected.conflicts[0].id)
        .await
        .unwrap();

    assert_eq!(decision.outcome, ArbitrationOutcome::WinnerSelected);
    assert_eq!(decision.winning_proposal_id, Some(coach.id));
    assert_eq!(decision.suppressed_proposal_ids, vec![planner.id]);

    // One factor per input proposal, carrying the priority indices.
    assert_eq!(decision.decision_factors.len(), 2);
    assert_eq!(decision.factor_for(coach.id).unwrap().value, json!(0));
    assert_eq!(decision.factor_for(planner.id).unwrap().value, json!(1));

    // Winner never appears among the losers.
    assert!(!decision.suppressed_proposal_ids.contains(&coach.id));
    assert!(!decision.vetoed_proposal_ids.contains(&coach.id));

    // Statuses settled with the decision id recorded.
    let planner_after = p.proposals.get(planner.id).await.unwrap();
    assert_eq!(planner_after.status, ProposalStatus::Suppressed);
    assert_eq!(planner_after.decision_id, Some(decision.id));

    // Exactly one suppression event, carrying the explanation.
    assert_eq!(p.recorder.count_of(event_types::ACTION_SUPPRESSED), 1);
    let suppressed_event = p
        .recorder
        .events()
        .into_iter()
        .find(|e| e.event_type == event_types::ACTION_SUPPRESSED)
        .unwrap();
    assert_eq!(
        suppressed_event.payload["decision_id"],
        json!(decision.id)
    );
    assert!(suppressed_event.payload["explanation"]
        .as_str()
        .unwrap()
        .contains("priority"));
}

#[tokio::test]
async fn veto_rule_without_escalation_vetoes_everything() {
    let p = plane().await;
    p.policies
        .save(
            ArbitrationPolicy::new(PolicyScope::Global, ResolutionStrategy::Veto)
                .with_veto_rule(VetoRule::new(
                    "no-high-risk",
                    "Block high risk",
                    VetoCondition::RiskLevel(RiskLevel::High),
                ))
                .as_default(),
        )
        .await;

    let mut input = tone_input("Coach", json!("direct"), 0.9);
    input.risk_level = RiskLevel::High;
    let proposal = p.submission.submit_proposal(input).await;

    let decision = p.arbitration.resolve_proposal(proposal.id).await.unwrap();

    assert_eq!(decision.outcome, ArbitrationOutcome::AllVetoed);
    assert!(decision.winning_proposal_id.is_none());
    assert!(!decision.requires_human_approval);
    assert_eq!(decision.vetoed_proposal_ids, vec![proposal.id]);

    let after = p.proposals.get(proposal.id).await.unwrap();
    assert_eq!(after.status, ProposalStatus::Vetoed);
}

#[tokio::test]
async fn high_risk_escalates_with_single_event() {
    let p = plane().await;
    p.policies
        .save(
            ArbitrationPolicy::new(PolicyScope::Global, ResolutionStrategy::Priority)
                .with_escalation_rule(EscalationRule {
                    risk_threshold: Some(RiskLevel::High),
                    ..Default::default()
                })
                .as_default(),
        )
        .await;

    let mut input = tone_input("Coach", json!("direct"), 0.75);
    input.risk_level = RiskLevel::High;
    let proposal = p.submission.submit_proposal(input).await;

    let decision = p.arbitration.resolve_proposal(proposal.id).await.unwrap();

    assert_eq!(decision.outcome, ArbitrationOutcome::Escalated);
    assert!(decision.requires_human_approval);
    assert!(!decision.executed);
    assert_eq!(p.recorder.count_of(event_types::ARBITRATION_ESCALATED), 1);

    let after = p.proposals.get(proposal.id).await.unwrap();
    assert_eq!(after.status, ProposalStatus::Escalated);
    assert_eq!(after.decision_id, Some(decision.id));
}

#[tokio::test]
async fn weighted_strategy_penalizes_cost_and_risk() {
    let p = plane().await;
    p.policies
        .save(
            ArbitrationPolicy::new(PolicyScope::Global, ResolutionStrategy::Weighted).as_default(),
        )
        .await;

    // Planner is slightly more confident but expensive and risky.
    let coach = p
        .submission
        .submit_proposal(tone_input("Coach", json!("encouraging"), 0.80))
        .await;
    let mut planner_input = tone_input("Planner", json!("direct"), 0.85);
    planner_input.cost_estimate = 2.0;
    planner_input.risk_level = RiskLevel::Medium;
    let planner = p.submission.submit_proposal(planner_input).await;

    let detected = p.detection.detect_conflicts().await;
    let decision = p
        .arbitration
        .resolve_conflict(detected.conflicts[0].id)
        .await
        .unwrap();

    assert_eq!(decision.winning_proposal_id, Some(coach.id));
    assert_eq!(decision.suppressed_proposal_ids, vec![planner.id]);
    assert_eq!(
        decision.factor_for(coach.id).unwrap().factor,
        "weighted_score"
    );
}

#[tokio::test]
async fn consensus_disagreement_escalates_with_no_clear_winner() {
    let p = plane().await;
    p.policies
        .save(
            ArbitrationPolicy::new(PolicyScope::Global, ResolutionStrategy::Consensus).as_default(),
        )
        .await;

    p.submission
        .submit_proposal(tone_input("Coach", json!("encouraging"), 0.8))
        .await;
    p.submission
        .submit_proposal(tone_input("Planner", json!("direct"), 0.8))
        .await;

    let detected = p.detection.detect_conflicts().await;
    let decision = p
        .arbitration
        .resolve_conflict(detected.conflicts[0].id)
        .await
        .unwrap();

    assert_eq!(decision.outcome, ArbitrationOutcome::Escalated);
    assert!(decision.reasoning_summary.contains("no_clear_winner"));
}

#[tokio::test]
async fn consensus_agreement_selects_first() {
    let p = plane().await;
    p.policies
        .save(
            ArbitrationPolicy::new(PolicyScope::Global, ResolutionStrategy::Consensus).as_default(),
        )
        .await;

    let first = p
        .submission
        .submit_proposal(tone_input("Coach", json!("neutral"), 0.7))
        .await;
    p.submission
        .submit_proposal(tone_input("Planner", json!("neutral"), 0.9))
        .await;

    let detected = p.detection.detect_conflicts().await;
    let decision = p
        .arbitration
        .resolve_conflict(detected.conflicts[0].id)
        .await
        .unwrap();

    assert_eq!(decision.outcome, ArbitrationOutcome::WinnerSelected);
    assert_eq!(decision.winning_proposal_id, Some(first.id));
}

#[tokio::test]
async fn escalation_approval_reuses_decision_and_approves_selection() {
    let p = plane().await;
    p.policies
        .save(
            ArbitrationPolicy::new(PolicyScope::Global, ResolutionStrategy::Priority)
                .with_escalation_rule(EscalationRule {
                    on_multi_agent_conflict: true,
                    ..Default::default()
                })
                .as_default(),
        )
        .await;

    let coach = p
        .submission
        .submit_proposal(tone_input("Coach", json!("encouraging"), 0.8))
        .await;
    let planner = p
        .submission
        .submit_proposal(tone_input("Planner", json!("direct"), 0.9))
        .await;

    let detected = p.detection.detect_conflicts().await;
    let escalated = p
        .arbitration
        .resolve_conflict(detected.conflicts[0].id)
        .await
        .unwrap();
    assert_eq!(escalated.outcome, ArbitrationOutcome::Escalated);

    let approved = p
        .escalation
        .approve_escalated_decision(escalated.id, "admin@example.com", Some(coach.id), None)
        .await
        .unwrap();

    // Same decision id, executed flipped, winner recorded.
    assert_eq!(approved.id, escalated.id);
    assert!(approved.executed);
    assert!(!approved.requires_human_approval);
    assert_eq!(approved.winning_proposal_id, Some(coach.id));

    assert_eq!(
        p.proposals.get(coach.id).await.unwrap().status,
        ProposalStatus::Approved
    );
    assert_eq!(
        p.proposals.get(planner.id).await.unwrap().status,
        ProposalStatus::Suppressed
    );
    assert_eq!(p.recorder.count_of(event_types::ESCALATION_APPROVED), 1);

    // A second approval hits the executed guard.
    let again = p
        .escalation
        .approve_escalated_decision(escalated.id, "admin@example.com", None, None)
        .await;
    assert!(again.is_err());
}

#[tokio::test]
async fn escalation_rejection_suppresses_all() {
    let p = plane().await;
    p.policies
        .save(
            ArbitrationPolicy::new(PolicyScope::Global, ResolutionStrategy::Priority)
                .with_escalation_rule(EscalationRule {
                    on_multi_agent_conflict: true,
                    ..Default::default()
                })
                .as_default(),
        )
        .await;

    let coach = p
        .submission
        .submit_proposal(tone_input("Coach", json!("encouraging"), 0.8))
        .await;
    let planner = p
        .submission
        .submit_proposal(tone_input("Planner", json!("direct"), 0.9))
        .await;

    let detected = p.detection.detect_conflicts().await;
    let escalated = p
        .arbitration
        .resolve_conflict(detected.conflicts[0].id)
        .await
        .unwrap();

    p.escalation
        .reject_escalated_decision(escalated.id, "neither is acceptable", Some("admin"), None)
        .await
        .unwrap();

    for id in [coach.id, planner.id] {
        assert_eq!(
            p.proposals.get(id).await.unwrap().status,
            ProposalStatus::Suppressed
        );
    }
    assert!(p.decisions.get(escalated.id).await.unwrap().executed);
}

#[tokio::test]
async fn unregistered_policies_fall_back_to_builtin_default() {
    let p = plane().await;

    let proposal = p
        .submission
        .submit_proposal(tone_input("Coach", json!("neutral"), 0.9))
        .await;

    let decision = p.arbitration.resolve_proposal(proposal.id).await.unwrap();
    assert_eq!(decision.outcome, ArbitrationOutcome::NoConflict);
    assert_eq!(decision.winning_proposal_id, Some(proposal.id));
    assert_eq!(
        p.proposals.get(proposal.id).await.unwrap().status,
        ProposalStatus::Approved
    );
}
