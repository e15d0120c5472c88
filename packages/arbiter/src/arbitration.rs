//! Policy-driven arbitration: veto, escalation, strategy, finalization.

use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use concord_events::{event_types, DomainEvent, EventBus};
use concord_observability::MetricsRegistry;

use crate::decision::{ArbitrationDecision, ArbitrationOutcome, DecisionFactor, FactorImpact};
use crate::error::ArbiterError;
use crate::policy::{ArbitrationPolicy, ResolutionStrategy, VetoCondition, VetoRule};
use crate::repository::{
    ArbitrationDecisionRepository, ArbitrationPolicyRepository, ConflictRepository,
    ProposalRepository,
};
use crate::types::{AgentActionProposal, Conflict, ProposalStatus, TargetRef};

/// Asks the adaptation layer whether a preference is locked for an agent.
#[async_trait::async_trait]
pub trait PreferenceLockProbe: Send + Sync {
    async fn is_locked(&self, agent_name: &str, target: &TargetRef) -> bool;
}

/// The arbiter.
pub struct ArbitrationService {
    proposals: Arc<dyn ProposalRepository>,
    conflicts: Arc<dyn ConflictRepository>,
    policies: Arc<dyn ArbitrationPolicyRepository>,
    decisions: Arc<dyn ArbitrationDecisionRepository>,
    bus: Arc<EventBus>,
    metrics: Arc<MetricsRegistry>,
    lock_probe: Option<Arc<dyn PreferenceLockProbe>>,
}

impl ArbitrationService {
    pub fn new(
        proposals: Arc<dyn ProposalRepository>,
        conflicts: Arc<dyn ConflictRepository>,
        policies: Arc<dyn ArbitrationPolicyRepository>,
        decisions: Arc<dyn ArbitrationDecisionRepository>,
        bus: Arc<EventBus>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            proposals,
            conflicts,
            policies,
            decisions,
            bus,
            metrics,
            lock_probe: None,
        }
    }

    pub fn with_lock_probe(mut self, probe: Arc<dyn PreferenceLockProbe>) -> Self {
        self.lock_probe = Some(probe);
        self
    }

    /// Resolve a detected conflict.
    pub async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
    ) -> Result<ArbitrationDecision, ArbiterError> {
        let conflict = self
            .conflicts
            .get(conflict_id)
            .await
            .ok_or(ArbiterError::ConflictNotFound(conflict_id))?;
        let proposals = self.proposals.list_by_ids(&conflict.proposal_ids).await;
        if proposals.is_empty() {
            return Err(ArbiterError::NoProposals);
        }
        self.arbitrate(proposals, Some(conflict)).await
    }

    /// Run a single uncontested proposal through veto and escalation gates.
    pub async fn resolve_proposal(
        &self,
        proposal_id: Uuid,
    ) -> Result<ArbitrationDecision, ArbiterError> {
        let proposal = self
            .proposals
            .get(proposal_id)
            .await
            .ok_or(ArbiterError::ProposalNotFound(proposal_id))?;
        self.arbitrate(vec![proposal], None).await
    }

    /// Policy lookup order: preference key, then agent, then registered
    /// default, then the built-in fallback.
    pub async fn find_applicable_policy(
        &self,
        proposals: &[AgentActionProposal],
    ) -> ArbitrationPolicy {
        for proposal in proposals {
            if proposal.target.kind == "preference" {
                if let Some(key) = &proposal.target.key {
                    if let Some(policy) = self.policies.find_by_preference(key).await {
                        return policy;
                    }
                }
            }
        }
        for proposal in proposals {
            if let Some(policy) = self.policies.find_by_agent(&proposal.agent_name).await {
                return policy;
            }
        }
        if let Some(policy) = self.policies.find_default().await {
            return policy;
        }
        ArbitrationPolicy::fallback_default()
    }

    async fn arbitrate(
        &self,
        proposals: Vec<AgentActionProposal>,
        conflict: Option<Conflict>,
    ) -> Result<ArbitrationDecision, ArbiterError> {
        let policy = self.find_applicable_policy(&proposals).await;
        let single_run = conflict.is_none() && proposals.len() == 1;

        // 1. Veto gate.
        let mut vetoed: Vec<(AgentActionProposal, VetoRule)> = Vec::new();
        let mut remaining: Vec<AgentActionProposal> = Vec::new();
        for proposal in proposals {
            match self.matching_veto_rule(&policy, &proposal).await {
                Some(rule) if rule.escalate_on_veto => {
                    // The matched rule demands a human: everything not yet
                    // vetoed escalates together.
                    let mut escalated = remaining;
                    escalated.push(proposal);
                    return Ok(self
                        .finalize_escalated(
                            &policy,
                            conflict,
                            escalated,
                            vetoed,
                            format!("veto rule '{}' requires human review", rule.name),
                        )
                        .await);
                }
                Some(rule) => vetoed.push((proposal, rule)),
                None => remaining.push(proposal),
            }
        }

        if remaining.is_empty() {
            return Ok(self.finalize_all_vetoed(&policy, conflict, vetoed).await);
        }

        // 2. Escalation gate.
        if let Some(reason) = self.escalation_reason(&policy, &remaining) {
            return Ok(self
                .finalize_escalated(&policy, conflict, remaining, vetoed, reason)
                .await);
        }

        // 3. Strategy.
        let (ordered, factors) = match policy.resolution_strategy {
            ResolutionStrategy::Priority => Self::rank_by_priority(&policy, remaining),
            ResolutionStrategy::Weighted => Self::rank_by_weight(&policy, remaining),
            ResolutionStrategy::Veto => Self::rank_by_confidence(remaining),
            ResolutionStrategy::Consensus => {
                match Self::rank_by_consensus(remaining) {
                    Ok(ranked) => ranked,
                    Err(disagreeing) => {
                        return Ok(self
                            .finalize_escalated(
                                &policy,
                                conflict,
                                disagreeing,
                                vetoed,
                                "no_clear_winner".to_string(),
                            )
                            .await);
                    }
                }
            }
        };

        // 4. Finalize.
        Ok(self
            .finalize_winner(&policy, conflict, single_run, ordered, factors, vetoed)
            .await)
    }

    async fn matching_veto_rule(
        &self,
        policy: &ArbitrationPolicy,
        proposal: &AgentActionProposal,
    ) -> Option<VetoRule> {
        for rule in &policy.veto_rules {
            let matched = match &rule.condition {
                VetoCondition::RiskLevel(level) => proposal.risk_level == *level,
                VetoCondition::CostAtLeast(threshold) => proposal.cost_estimate >= *threshold,
                VetoCondition::AgentBlacklist(agents) => agents.contains(&proposal.agent_name),
                VetoCondition::PreferenceLock => match &self.lock_probe {
                    Some(probe) => probe.is_locked(&proposal.agent_name, &proposal.target).await,
                    None => false,
                },
            };
            if matched {
                return Some(rule.clone());
            }
        }
        None
    }

    fn escalation_reason(
        &self,
        policy: &ArbitrationPolicy,
        proposals: &[AgentActionProposal],
    ) -> Option<String> {
        let rule = &policy.escalation_rule;

        for proposal in proposals {
            if rule.always_escalate_agents.contains(&proposal.agent_name) {
                return Some(format!("agent '{}' always escalates", proposal.agent_name));
            }
        }

        if rule.on_multi_agent_conflict {
            let agents: HashSet<&str> = proposals.iter().map(|p| p.agent_name.as_str()).collect();
            if agents.len() > 1 {
                return Some("multiple agents in conflict".to_string());
            }
        }

        if let Some(threshold) = rule.risk_threshold {
            if let Some(proposal) = proposals.iter().find(|p| p.risk_level >= threshold) {
                return Some(format!(
                    "risk level {} at or above threshold {}",
                    proposal.risk_level, threshold
                ));
            }
        }

        if let Some(threshold) = rule.cost_threshold {
            if let Some(proposal) = proposals.iter().find(|p| p.cost_estimate >= threshold) {
                return Some(format!(
                    "cost estimate {:.2} at or above threshold {:.2}",
                    proposal.cost_estimate, threshold
                ));
            }
        }

        if let Some(threshold) = rule.confidence_threshold {
            if let Some(proposal) = proposals.iter().find(|p| p.confidence_score < threshold) {
                return Some(format!(
                    "confidence {:.2} below threshold {:.2}",
                    proposal.confidence_score, threshold
                ));
            }
        }

        None
    }

    // ========================================================================
    // STRATEGY RANKING
    // ========================================================================

    /// Priority: lower index in the policy order wins; unknown agents last.
    fn rank_by_priority(
        policy: &ArbitrationPolicy,
        mut proposals: Vec<AgentActionProposal>,
    ) -> (Vec<AgentActionProposal>, Vec<DecisionFactor>) {
        proposals.sort_by(|a, b| {
            policy
                .priority_index(&a.agent_name)
                .cmp(&policy.priority_index(&b.agent_name))
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let factors = proposals
            .iter()
            .enumerate()
            .map(|(position, proposal)| {
                let index = policy.priority_index(&proposal.agent_name);
                DecisionFactor {
                    proposal_id: proposal.id,
                    agent_name: proposal.agent_name.clone(),
                    factor: "priority_index".to_string(),
                    value: if index == usize::MAX {
                        Value::Null
                    } else {
                        json!(index)
                    },
                    impact: if position == 0 {
                        FactorImpact::Positive
                    } else {
                        FactorImpact::Negative
                    },
                }
            })
            .collect();
        (proposals, factors)
    }

    /// Weighted: `w_c*confidence - w_cost*cost - w_risk*risk`. Ties break
    /// by confidence, then submission time, then id (total order).
    fn rank_by_weight(
        policy: &ArbitrationPolicy,
        mut proposals: Vec<AgentActionProposal>,
    ) -> (Vec<AgentActionProposal>, Vec<DecisionFactor>) {
        let weights = policy.weights;
        let score = |p: &AgentActionProposal| {
            weights.confidence * p.confidence_score
                - weights.cost * p.cost_estimate
                - weights.risk * p.risk_level.numeric()
        };

        proposals.sort_by(|a, b| {
            score(b)
                .partial_cmp(&score(a))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.confidence_score
                        .partial_cmp(&a.confidence_score)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let factors = proposals
            .iter()
            .enumerate()
            .map(|(position, proposal)| DecisionFactor {
                proposal_id: proposal.id,
                agent_name: proposal.agent_name.clone(),
                factor: "weighted_score".to_string(),
                value: json!(score(proposal)),
                impact: if position == 0 {
                    FactorImpact::Positive
                } else {
                    FactorImpact::Negative
                },
            })
            .collect();
        (proposals, factors)
    }

    /// Veto strategy: after veto gating, highest confidence wins.
    fn rank_by_confidence(
        mut proposals: Vec<AgentActionProposal>,
    ) -> (Vec<AgentActionProposal>, Vec<DecisionFactor>) {
        proposals.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let factors = proposals
            .iter()
            .enumerate()
            .map(|(position, proposal)| DecisionFactor {
                proposal_id: proposal.id,
                agent_name: proposal.agent_name.clone(),
                factor: "confidence".to_string(),
                value: json!(proposal.confidence_score),
                impact: if position == 0 {
                    FactorImpact::Positive
                } else {
                    FactorImpact::Negative
                },
            })
            .collect();
        (proposals, factors)
    }

    /// Consensus: unanimous values pick the earliest proposal; otherwise
    /// the disagreeing set escalates.
    #[allow(clippy::type_complexity)]
    fn rank_by_consensus(
        mut proposals: Vec<AgentActionProposal>,
    ) -> Result<(Vec<AgentActionProposal>, Vec<DecisionFactor>), Vec<AgentActionProposal>> {
        let first_value = proposals[0].proposed_value.clone();
        if proposals.iter().any(|p| p.proposed_value != first_value) {
            return Err(proposals);
        }

        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let factors = proposals
            .iter()
            .enumerate()
            .map(|(position, proposal)| DecisionFactor {
                proposal_id: proposal.id,
                agent_name: proposal.agent_name.clone(),
                factor: "consensus".to_string(),
                value: proposal.proposed_value.clone(),
                impact: if position == 0 {
                    FactorImpact::Positive
                } else {
                    FactorImpact::Neutral
                },
            })
            .collect();
        Ok((proposals, factors))
    }

    // ========================================================================
    // FINALIZATION
    //
    // Ordering contract: the decision is persisted before the conflict is
    // marked resolved, before proposal statuses change, and before any event
    // goes out. Subscribers observe "decision, then events".
    // ========================================================================

    fn veto_factors(vetoed: &[(AgentActionProposal, VetoRule)]) -> Vec<DecisionFactor> {
        vetoed
            .iter()
            .map(|(proposal, rule)| DecisionFactor {
                proposal_id: proposal.id,
                agent_name: proposal.agent_name.clone(),
                factor: "veto_rule".to_string(),
                value: json!(rule.name),
                impact: FactorImpact::Negative,
            })
            .collect()
    }

    async fn finalize_winner(
        &self,
        policy: &ArbitrationPolicy,
        conflict: Option<Conflict>,
        single_run: bool,
        ordered: Vec<AgentActionProposal>,
        mut factors: Vec<DecisionFactor>,
        vetoed: Vec<(AgentActionProposal, VetoRule)>,
    ) -> ArbitrationDecision {
        let winner = ordered[0].clone();
        let losers: Vec<AgentActionProposal> = ordered[1..].to_vec();

        let outcome = if single_run {
            ArbitrationOutcome::NoConflict
        } else {
            ArbitrationOutcome::WinnerSelected
        };
        let mut decision = ArbitrationDecision::new(
            conflict.as_ref().map(|c| c.id),
            policy.id,
            policy.resolution_strategy,
            outcome,
        );
        decision.winning_proposal_id = Some(winner.id);
        decision.suppressed_proposal_ids = losers.iter().map(|p| p.id).collect();
        decision.vetoed_proposal_ids = vetoed.iter().map(|(p, _)| p.id).collect();
        factors.extend(Self::veto_factors(&vetoed));
        decision.decision_factors = factors;
        decision.reasoning_summary = if single_run {
            format!(
                "uncontested proposal from {} passed veto and escalation checks",
                winner.agent_name
            )
        } else {
            format!(
                "{} selected by {:?} strategy over {} competing proposal(s)",
                winner.agent_name,
                policy.resolution_strategy,
                losers.len() + vetoed.len(),
            )
        };

        self.decisions.save(decision.clone()).await;
        if let Some(conflict) = &conflict {
            let _ = self.conflicts.mark_resolved(conflict.id).await;
        }

        let _ = self
            .proposals
            .update_status(winner.id, ProposalStatus::Approved, Some(decision.id))
            .await;
        for loser in &losers {
            let _ = self
                .proposals
                .update_status(loser.id, ProposalStatus::Suppressed, Some(decision.id))
                .await;
        }
        for (proposal, _) in &vetoed {
            let _ = self
                .proposals
                .update_status(proposal.id, ProposalStatus::Vetoed, Some(decision.id))
                .await;
        }

        self.metrics.inc_counter(
            "arbitrations_total",
            &[("outcome", if single_run { "no_conflict" } else { "winner_selected" })],
        );

        self.bus
            .dispatch(DomainEvent::new(
                event_types::ARBITRATION_RESOLVED,
                "arbitration",
                decision.id.to_string(),
                json!({
                    "conflict_id": decision.conflict_id,
                    "outcome": decision.outcome,
                    "strategy": decision.strategy_used,
                    "winning_proposal_id": winner.id,
                    "winning_agent": winner.agent_name,
                }),
            ))
            .await;

        for loser in &losers {
            let explanation = Self::suppression_explanation(policy, &winner, loser);
            self.bus
                .dispatch(DomainEvent::new(
                    event_types::ACTION_SUPPRESSED,
                    "proposal",
                    loser.id.to_string(),
                    json!({
                        "decision_id": decision.id,
                        "agent": loser.agent_name,
                        "winning_proposal_id": winner.id,
                        "explanation": explanation,
                    }),
                ))
                .await;
        }

        tracing::info!(
            decision_id = %decision.id,
            winner = %winner.agent_name,
            outcome = ?decision.outcome,
            "arbitration resolved"
        );
        decision
    }

    fn suppression_explanation(
        policy: &ArbitrationPolicy,
        winner: &AgentActionProposal,
        loser: &AgentActionProposal,
    ) -> String {
        match policy.resolution_strategy {
            ResolutionStrategy::Priority => format!(
                "{} (priority {}) outranked {} (priority {})",
                winner.agent_name,
                policy.priority_index(&winner.agent_name),
                loser.agent_name,
                policy.priority_index(&loser.agent_name),
            ),
            ResolutionStrategy::Weighted => {
                let weights = policy.weights;
                let score = |p: &AgentActionProposal| {
                    weights.confidence * p.confidence_score
                        - weights.cost * p.cost_estimate
                        - weights.risk * p.risk_level.numeric()
                };
                format!(
                    "{} scored {:.3} against {:.3} for {}",
                    winner.agent_name,
                    score(winner),
                    score(loser),
                    loser.agent_name,
                )
            }
            ResolutionStrategy::Veto | ResolutionStrategy::Consensus => format!(
                "{} (confidence {:.2}) won over {} (confidence {:.2})",
                winner.agent_name,
                winner.confidence_score,
                loser.agent_name,
                loser.confidence_score,
            ),
        }
    }

    async fn finalize_all_vetoed(
        &self,
        policy: &ArbitrationPolicy,
        conflict: Option<Conflict>,
        vetoed: Vec<(AgentActionProposal, VetoRule)>,
    ) -> ArbitrationDecision {
        let mut decision = ArbitrationDecision::new(
            conflict.as_ref().map(|c| c.id),
            policy.id,
            policy.resolution_strategy,
            ArbitrationOutcome::AllVetoed,
        );
        decision.vetoed_proposal_ids = vetoed.iter().map(|(p, _)| p.id).collect();
        decision.decision_factors = Self::veto_factors(&vetoed);
        decision.reasoning_summary = format!(
            "all {} proposal(s) vetoed by policy rules",
            vetoed.len()
        );

        self.decisions.save(decision.clone()).await;
        if let Some(conflict) = &conflict {
            let _ = self.conflicts.mark_resolved(conflict.id).await;
        }
        for (proposal, _) in &vetoed {
            let _ = self
                .proposals
                .update_status(proposal.id, ProposalStatus::Vetoed, Some(decision.id))
                .await;
        }

        self.metrics
            .inc_counter("arbitrations_total", &[("outcome", "all_vetoed")]);
        self.bus
            .dispatch(DomainEvent::new(
                event_types::ARBITRATION_RESOLVED,
                "arbitration",
                decision.id.to_string(),
                json!({
                    "conflict_id": decision.conflict_id,
                    "outcome": decision.outcome,
                    "vetoed_proposal_ids": decision.vetoed_proposal_ids,
                }),
            ))
            .await;

        tracing::info!(decision_id = %decision.id, "arbitration resolved: all proposals vetoed");
        decision
    }

    async fn finalize_escalated(
        &self,
        policy: &ArbitrationPolicy,
        conflict: Option<Conflict>,
        escalated: Vec<AgentActionProposal>,
        vetoed: Vec<(AgentActionProposal, VetoRule)>,
        reason: String,
    ) -> ArbitrationDecision {
        let mut decision = ArbitrationDecision::new(
            conflict.as_ref().map(|c| c.id),
            policy.id,
            policy.resolution_strategy,
            ArbitrationOutcome::Escalated,
        );
        decision.vetoed_proposal_ids = vetoed.iter().map(|(p, _)| p.id).collect();
        decision.requires_human_approval = true;
        let mut factors: Vec<DecisionFactor> = escalated
            .iter()
            .map(|proposal| DecisionFactor {
                proposal_id: proposal.id,
                agent_name: proposal.agent_name.clone(),
                factor: "escalation".to_string(),
                value: json!(reason),
                impact: FactorImpact::Neutral,
            })
            .collect();
        factors.extend(Self::veto_factors(&vetoed));
        decision.decision_factors = factors;
        decision.reasoning_summary = format!("escalated to human review: {reason}");

        self.decisions.save(decision.clone()).await;
        if let Some(conflict) = &conflict {
            let _ = self.conflicts.mark_resolved(conflict.id).await;
        }
        for proposal in &escalated {
            let _ = self
                .proposals
                .update_status(proposal.id, ProposalStatus::Escalated, Some(decision.id))
                .await;
        }
        for (proposal, _) in &vetoed {
            let _ = self
                .proposals
                .update_status(proposal.id, ProposalStatus::Vetoed, Some(decision.id))
                .await;
        }

        // The "if a human only approves one" hint: highest confidence first.
        let suggested = escalated
            .iter()
            .max_by(|a, b| {
                a.confidence_score
                    .partial_cmp(&b.confidence_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|p| p.id);

        self.metrics
            .inc_counter("arbitrations_total", &[("outcome", "escalated")]);
        self.bus
            .dispatch(DomainEvent::new(
                event_types::ARBITRATION_ESCALATED,
                "arbitration",
                decision.id.to_string(),
                json!({
                    "conflict_id": decision.conflict_id,
                    "escalated_proposal_ids": escalated.iter().map(|p| p.id).collect::<Vec<_>>(),
                    "reason": reason,
                    "suggested_proposal_id": suggested,
                }),
            ))
            .await;

        tracing::info!(decision_id = %decision.id, reason = %reason, "arbitration escalated");
        decision
    }
}
