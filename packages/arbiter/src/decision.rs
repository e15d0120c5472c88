//! Arbitration decisions and their factors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::policy::ResolutionStrategy;

/// Terminal outcome of an arbitration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbitrationOutcome {
    WinnerSelected,
    AllVetoed,
    Escalated,
    /// Single uncontested proposal
    NoConflict,
}

/// Direction a factor pushed a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorImpact {
    Positive,
    Negative,
    Neutral,
}

/// One factor that determined a proposal's fate. Decisions carry exactly
/// one factor per input proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionFactor {
    pub proposal_id: Uuid,
    pub agent_name: String,
    /// What was compared (e.g. "priority_index", "weighted_score")
    pub factor: String,
    pub value: Value,
    pub impact: FactorImpact,
}

/// The immutable verdict on a conflict. Only `executed` (and the winner it
/// designates) may change afterwards, via escalation approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrationDecision {
    pub id: Uuid,
    /// Conflict this decision settles; `None` for single-proposal runs
    pub conflict_id: Option<Uuid>,
    pub policy_id: Uuid,
    pub strategy_used: ResolutionStrategy,
    pub outcome: ArbitrationOutcome,
    pub winning_proposal_id: Option<Uuid>,
    pub suppressed_proposal_ids: Vec<Uuid>,
    pub vetoed_proposal_ids: Vec<Uuid>,
    pub decision_factors: Vec<DecisionFactor>,
    pub reasoning_summary: String,
    pub requires_human_approval: bool,
    pub executed: bool,
    pub created_at: DateTime<Utc>,
}

impl ArbitrationDecision {
    pub fn new(
        conflict_id: Option<Uuid>,
        policy_id: Uuid,
        strategy_used: ResolutionStrategy,
        outcome: ArbitrationOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            conflict_id,
            policy_id,
            strategy_used,
            outcome,
            winning_proposal_id: None,
            suppressed_proposal_ids: Vec::new(),
            vetoed_proposal_ids: Vec::new(),
            decision_factors: Vec::new(),
            reasoning_summary: String::new(),
            requires_human_approval: false,
            executed: false,
            created_at: Utc::now(),
        }
    }

    /// Is this an escalation still waiting for a human?
    pub fn is_open_escalation(&self) -> bool {
        self.outcome == ArbitrationOutcome::Escalated && !self.executed
    }

    /// Factor recorded for one proposal, when present.
    pub fn factor_for(&self, proposal_id: Uuid) -> Option<&DecisionFactor> {
        self.decision_factors
            .iter()
            .find(|f| f.proposal_id == proposal_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_escalation() {
        let mut decision = ArbitrationDecision::new(
            None,
            Uuid::new_v4(),
            ResolutionStrategy::Priority,
            ArbitrationOutcome::Escalated,
        );
        decision.requires_human_approval = true;
        assert!(decision.is_open_escalation());

        decision.executed = true;
        assert!(!decision.is_open_escalation());
    }
}
