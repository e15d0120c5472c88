//! Per-agent adaptation policies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use concord_registry::RiskLevel;

/// Whether changes apply automatically or wait for a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationMode {
    Manual,
    Auto,
}

/// Sliding-window rate limit for automatic changes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimit {
    pub max_changes: u32,
    pub window_ms: u64,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            max_changes: 5,
            window_ms: 86_400_000, // one day
        }
    }
}

/// Per-preference override within a policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeRestriction {
    pub category: String,
    pub key: String,
    /// Mode override for this preference
    #[serde(default)]
    pub mode: Option<AdaptationMode>,
    /// Hard lock: never auto-adapt this preference
    #[serde(default)]
    pub locked: bool,
    /// Confidence floor override for this preference
    #[serde(default)]
    pub min_confidence: Option<f64>,
}

/// Adaptation policy for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationPolicy {
    pub id: Uuid,
    pub agent_name: String,
    pub mode: AdaptationMode,
    pub user_opted_in: bool,
    pub min_confidence: f64,
    pub allowed_risk_levels: Vec<RiskLevel>,
    pub cooldown_ms: u64,
    pub rate_limit: RateLimit,
    pub last_auto_adapt_at: Option<DateTime<Utc>>,
    pub current_window_count: u32,
    pub window_started_at: Option<DateTime<Utc>>,
    pub scope_restrictions: Vec<ScopeRestriction>,
}

impl AdaptationPolicy {
    /// Conservative default: manual, opted out, low-risk only.
    pub fn default_for(agent_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_name: agent_name.into(),
            mode: AdaptationMode::Manual,
            user_opted_in: false,
            min_confidence: 0.7,
            allowed_risk_levels: vec![RiskLevel::Low],
            cooldown_ms: 3_600_000,
            rate_limit: RateLimit::default(),
            last_auto_adapt_at: None,
            current_window_count: 0,
            window_started_at: None,
            scope_restrictions: Vec::new(),
        }
    }

    pub fn scope_for(&self, category: &str, key: &str) -> Option<&ScopeRestriction> {
        self.scope_restrictions
            .iter()
            .find(|s| s.category == category && s.key == key)
    }

    fn scope_for_mut(&mut self, category: &str, key: &str) -> Option<&mut ScopeRestriction> {
        self.scope_restrictions
            .iter_mut()
            .find(|s| s.category == category && s.key == key)
    }

    /// Insert or replace the restriction for one preference.
    pub fn upsert_scope(&mut self, restriction: ScopeRestriction) {
        if let Some(existing) =
            self.scope_for_mut(&restriction.category, &restriction.key)
        {
            *existing = restriction;
        } else {
            self.scope_restrictions.push(restriction);
        }
    }

    pub fn is_locked(&self, category: &str, key: &str) -> bool {
        self.scope_for(category, key).map(|s| s.locked).unwrap_or(false)
    }

    /// Mode for one preference: scope override, else the policy mode.
    pub fn effective_mode(&self, category: &str, key: &str) -> AdaptationMode {
        self.scope_for(category, key)
            .and_then(|s| s.mode)
            .unwrap_or(self.mode)
    }

    /// Confidence floor before the registry threshold is folded in.
    pub fn effective_min_confidence(&self, category: &str, key: &str) -> f64 {
        let scoped = self
            .scope_for(category, key)
            .and_then(|s| s.min_confidence)
            .unwrap_or(0.0);
        self.min_confidence.max(scoped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_conservative() {
        let policy = AdaptationPolicy::default_for("Coach");
        assert_eq!(policy.mode, AdaptationMode::Manual);
        assert!(!policy.user_opted_in);
        assert_eq!(policy.min_confidence, 0.7);
        assert_eq!(policy.allowed_risk_levels, vec![RiskLevel::Low]);
    }

    #[test]
    fn test_scope_overrides() {
        let mut policy = AdaptationPolicy::default_for("Coach");
        policy.upsert_scope(ScopeRestriction {
            category: "communication".to_string(),
            key: "tone".to_string(),
            mode: Some(AdaptationMode::Manual),
            locked: true,
            min_confidence: Some(0.95),
        });
        policy.mode = AdaptationMode::Auto;

        assert!(policy.is_locked("communication", "tone"));
        assert_eq!(
            policy.effective_mode("communication", "tone"),
            AdaptationMode::Manual
        );
        assert_eq!(
            policy.effective_mode("communication", "verbosity"),
            AdaptationMode::Auto
        );
        assert_eq!(policy.effective_min_confidence("communication", "tone"), 0.95);
    }

    #[test]
    fn test_upsert_scope_replaces() {
        let mut policy = AdaptationPolicy::default_for("Coach");
        let restriction = |locked| ScopeRestriction {
            category: "communication".to_string(),
            key: "tone".to_string(),
            mode: None,
            locked,
            min_confidence: None,
        };
        policy.upsert_scope(restriction(true));
        policy.upsert_scope(restriction(false));

        assert_eq!(policy.scope_restrictions.len(), 1);
        assert!(!policy.is_locked("communication", "tone"));
    }
}
