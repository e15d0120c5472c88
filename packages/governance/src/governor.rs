//! Cooldown and suggestion-rate gating for agent actions.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

use crate::policy::AgentPolicy;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Process-wide governance state: registered policies, per
/// `(agent, aggregate)` cooldown stamps and per `(agent, event)` suggestion
/// counts. Created at startup, cleared only by tests.
pub struct AgentGovernor {
    policies: RwLock<HashMap<String, AgentPolicy>>,
    cooldowns: Mutex<HashMap<String, i64>>,
    suggestion_counts: Mutex<HashMap<String, u32>>,
}

impl Default for AgentGovernor {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentGovernor {
    pub fn new() -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
            cooldowns: Mutex::new(HashMap::new()),
            suggestion_counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn register_policy(&self, policy: AgentPolicy) {
        self.policies
            .write()
            .insert(policy.agent_name.clone(), policy);
    }

    /// Policy for an agent; unregistered agents get the default policy.
    pub fn policy_for(&self, agent: &str) -> AgentPolicy {
        self.policies
            .read()
            .get(agent)
            .cloned()
            .unwrap_or_else(|| AgentPolicy::for_agent(agent))
    }

    fn cooldown_key(agent: &str, aggregate_id: &str) -> String {
        format!("{agent}:{aggregate_id}")
    }

    /// Has the cooldown for `(agent, aggregate)` elapsed? Read-only.
    pub fn can_take_action(&self, agent: &str, aggregate_id: &str) -> bool {
        let policy = self.policy_for(agent);
        let cooldowns = self.cooldowns.lock();
        match cooldowns.get(&Self::cooldown_key(agent, aggregate_id)) {
            Some(last_at) => now_ms() - last_at >= policy.cooldown_ms as i64,
            None => true,
        }
    }

    /// Check the cooldown and stamp it in one exclusive section, so two
    /// concurrent callers cannot both fire.
    pub fn try_begin_action(&self, agent: &str, aggregate_id: &str) -> bool {
        let policy = self.policy_for(agent);
        let key = Self::cooldown_key(agent, aggregate_id);
        let now = now_ms();

        let mut cooldowns = self.cooldowns.lock();
        if let Some(last_at) = cooldowns.get(&key) {
            if now - last_at < policy.cooldown_ms as i64 {
                return false;
            }
        }
        cooldowns.insert(key, now);
        true
    }

    fn suggestion_key(agent: &str, event_id: &str) -> String {
        format!("{agent}:{event_id}")
    }

    /// May the agent emit another suggestion for this event?
    pub fn can_make_suggestion(&self, agent: &str, event_id: &str) -> bool {
        let policy = self.policy_for(agent);
        let counts = self.suggestion_counts.lock();
        counts
            .get(&Self::suggestion_key(agent, event_id))
            .copied()
            .unwrap_or(0)
            < policy.max_suggestions_per_event
    }

    /// Count one suggestion against the `(agent, event)` budget and return
    /// whether it was within the limit.
    pub fn try_count_suggestion(&self, agent: &str, event_id: &str) -> bool {
        let policy = self.policy_for(agent);
        let key = Self::suggestion_key(agent, event_id);

        let mut counts = self.suggestion_counts.lock();
        let count = counts.entry(key).or_insert(0);
        if *count >= policy.max_suggestions_per_event {
            return false;
        }
        *count += 1;
        true
    }

    /// Test hook: wipe all runtime state. Never called on production paths.
    pub fn clear(&self) {
        self.cooldowns.lock().clear();
        self.suggestion_counts.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unregistered_agent_gets_default_policy() {
        let governor = AgentGovernor::new();
        let policy = governor.policy_for("Coach");
        assert_eq!(policy.agent_name, "Coach");
        assert!(policy.fallback_to_rules);
    }

    #[test]
    fn test_cooldown_blocks_second_action() {
        let governor = AgentGovernor::new();
        governor.register_policy(AgentPolicy::for_agent("Coach").with_cooldown_ms(60_000));

        assert!(governor.try_begin_action("Coach", "user-1"));
        assert!(!governor.try_begin_action("Coach", "user-1"));
        assert!(!governor.can_take_action("Coach", "user-1"));
    }

    #[test]
    fn test_cooldown_is_per_aggregate() {
        let governor = AgentGovernor::new();
        governor.register_policy(AgentPolicy::for_agent("Coach").with_cooldown_ms(60_000));

        assert!(governor.try_begin_action("Coach", "user-1"));
        assert!(governor.try_begin_action("Coach", "user-2"));
    }

    #[test]
    fn test_zero_cooldown_always_allows() {
        let governor = AgentGovernor::new();
        governor.register_policy(AgentPolicy::for_agent("Coach").with_cooldown_ms(0));

        assert!(governor.try_begin_action("Coach", "user-1"));
        assert!(governor.try_begin_action("Coach", "user-1"));
    }

    #[test]
    fn test_suggestion_budget_per_event() {
        let governor = AgentGovernor::new();
        governor
            .register_policy(AgentPolicy::for_agent("Planner").with_max_suggestions_per_event(2));

        assert!(governor.try_count_suggestion("Planner", "evt-1"));
        assert!(governor.try_count_suggestion("Planner", "evt-1"));
        assert!(!governor.try_count_suggestion("Planner", "evt-1"));
        assert!(!governor.can_make_suggestion("Planner", "evt-1"));

        // Separate event, fresh budget
        assert!(governor.can_make_suggestion("Planner", "evt-2"));
    }

    #[test]
    fn test_clear_resets_state() {
        let governor = AgentGovernor::new();
        governor.register_policy(AgentPolicy::for_agent("Coach").with_cooldown_ms(60_000));
        assert!(governor.try_begin_action("Coach", "user-1"));

        governor.clear();
        assert!(governor.try_begin_action("Coach", "user-1"));
    }
}
