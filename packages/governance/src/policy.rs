//! Per-agent governance policies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of advisory agent kinds known to the plane.
///
/// New kinds require policy registration before they may act.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentKind {
    /// Encouragement and habit coaching
    Coach,
    /// Scheduling and reminders
    Planner,
    /// Activity summarization
    Logger,
}

impl AgentKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Coach => "Coach",
            Self::Planner => "Planner",
            Self::Logger => "Logger",
        }
    }

    pub fn all() -> [AgentKind; 3] {
        [Self::Coach, Self::Planner, Self::Logger]
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Governance policy for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPolicy {
    /// Agent this policy governs
    pub agent_name: String,
    /// Maximum suggestions the agent may emit per triggering event
    pub max_suggestions_per_event: u32,
    /// Minimum confidence an AI response needs before it is used
    pub confidence_threshold: f64,
    /// Cooldown between actions on the same aggregate
    pub cooldown_ms: u64,
    /// May this agent call the LLM at all?
    pub ai_enabled: bool,
    /// Fall back to rule-based output when AI fails or is disallowed
    pub fallback_to_rules: bool,
}

impl AgentPolicy {
    pub fn for_agent(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            max_suggestions_per_event: 3,
            confidence_threshold: 0.7,
            cooldown_ms: 30_000,
            ai_enabled: true,
            fallback_to_rules: true,
        }
    }

    pub fn with_cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.cooldown_ms = cooldown_ms;
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_max_suggestions_per_event(mut self, max: u32) -> Self {
        self.max_suggestions_per_event = max;
        self
    }

    pub fn ai_disabled(mut self) -> Self {
        self.ai_enabled = false;
        self
    }

    pub fn without_fallback(mut self) -> Self {
        self.fallback_to_rules = false;
        self
    }
}
