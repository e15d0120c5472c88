//! Arbitration policies: strategies, veto rules, escalation rules.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use concord_registry::RiskLevel;

/// Where a policy applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "value", rename_all = "snake_case")]
pub enum PolicyScope {
    /// Applies everywhere
    Global,
    /// Applies to proposals from one agent
    Agent(String),
    /// Applies to proposals targeting one preference key
    Preference(String),
}

/// How a conflict is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Fixed agent precedence order
    Priority,
    /// Confidence/cost/risk weighted scoring
    Weighted,
    /// Veto gating, then highest confidence
    Veto,
    /// All proposals must agree, else escalate
    Consensus,
}

/// Weights for the weighted strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Weights {
    pub confidence: f64,
    pub cost: f64,
    pub risk: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            confidence: 1.0,
            cost: 0.1,
            risk: 0.5,
        }
    }
}

/// A condition under which a proposal is vetoed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "condition", content = "value", rename_all = "snake_case")]
pub enum VetoCondition {
    /// Proposal risk equals this level
    RiskLevel(RiskLevel),
    /// Proposal cost estimate is at least this
    CostAtLeast(f64),
    /// Proposing agent is on the list
    AgentBlacklist(Vec<String>),
    /// The targeted preference is locked
    PreferenceLock,
}

/// One veto rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VetoRule {
    pub id: String,
    pub name: String,
    pub condition: VetoCondition,
    /// Escalate to a human instead of silently vetoing
    #[serde(default)]
    pub escalate_on_veto: bool,
}

impl VetoRule {
    pub fn new(id: impl Into<String>, name: impl Into<String>, condition: VetoCondition) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            condition,
            escalate_on_veto: false,
        }
    }

    pub fn escalating(mut self) -> Self {
        self.escalate_on_veto = true;
        self
    }
}

/// When to defer to a human even without a veto.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscalationRule {
    /// Escalate at or above this risk
    #[serde(default)]
    pub risk_threshold: Option<RiskLevel>,
    /// Escalate at or above this cost
    #[serde(default)]
    pub cost_threshold: Option<f64>,
    /// Escalate below this confidence
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
    /// Escalate whenever distinct agents conflict
    #[serde(default)]
    pub on_multi_agent_conflict: bool,
    /// Agents whose proposals always escalate
    #[serde(default)]
    pub always_escalate_agents: Vec<String>,
}

/// A full arbitration policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrationPolicy {
    pub id: Uuid,
    pub scope: PolicyScope,
    pub resolution_strategy: ResolutionStrategy,
    /// Agent precedence for the priority strategy; lower index wins
    #[serde(default)]
    pub priority_order: Vec<String>,
    #[serde(default)]
    pub weights: Weights,
    #[serde(default)]
    pub veto_rules: Vec<VetoRule>,
    #[serde(default)]
    pub escalation_rule: EscalationRule,
    #[serde(default)]
    pub is_default: bool,
}

impl ArbitrationPolicy {
    pub fn new(scope: PolicyScope, resolution_strategy: ResolutionStrategy) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope,
            resolution_strategy,
            priority_order: Vec::new(),
            weights: Weights::default(),
            veto_rules: Vec::new(),
            escalation_rule: EscalationRule::default(),
            is_default: false,
        }
    }

    pub fn with_priority_order(mut self, order: Vec<&str>) -> Self {
        self.priority_order = order.into_iter().map(String::from).collect();
        self
    }

    pub fn with_weights(mut self, weights: Weights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_veto_rule(mut self, rule: VetoRule) -> Self {
        self.veto_rules.push(rule);
        self
    }

    pub fn with_escalation_rule(mut self, rule: EscalationRule) -> Self {
        self.escalation_rule = rule;
        self
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Built-in policy used when no policy is registered at all: known
    /// agent precedence, no vetoes, no automatic escalation.
    pub fn fallback_default() -> Self {
        Self::new(PolicyScope::Global, ResolutionStrategy::Priority)
            .with_priority_order(vec!["Coach", "Planner", "Logger"])
            .as_default()
    }

    /// Position of an agent in the priority order; unknown agents sort last.
    pub fn priority_index(&self, agent: &str) -> usize {
        self.priority_order
            .iter()
            .position(|a| a == agent)
            .unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_index_unknown_agent_sorts_last() {
        let policy = ArbitrationPolicy::fallback_default();
        assert_eq!(policy.priority_index("Coach"), 0);
        assert_eq!(policy.priority_index("Planner"), 1);
        assert_eq!(policy.priority_index("Intruder"), usize::MAX);
    }

    #[test]
    fn test_veto_rule_builder() {
        let rule = VetoRule::new(
            "no-high-risk",
            "Block high risk",
            VetoCondition::RiskLevel(RiskLevel::High),
        )
        .escalating();
        assert!(rule.escalate_on_veto);
    }

    #[test]
    fn test_policy_serde_roundtrip() {
        let policy = ArbitrationPolicy::new(
            PolicyScope::Preference("communication.tone".to_string()),
            ResolutionStrategy::Weighted,
        )
        .with_veto_rule(VetoRule::new(
            "cost-cap",
            "Cap cost",
            VetoCondition::CostAtLeast(5.0),
        ));

        let json = serde_json::to_string(&policy).unwrap();
        let back: ArbitrationPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(back.resolution_strategy, ResolutionStrategy::Weighted);
        assert_eq!(back.veto_rules.len(), 1);
    }
}
