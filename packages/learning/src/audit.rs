//! Preference audit: summaries, default comparison, change history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::LearningError;
use crate::profile::PreferenceChange;
use crate::service::LearningProfileService;

/// Audit roll-up for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSummary {
    pub agent_name: String,
    pub preference_count: usize,
    pub changed_from_default: usize,
    pub total_changes: usize,
    pub total_feedback: u64,
    pub acceptance_rate: f64,
    pub last_change_at: Option<DateTime<Utc>>,
}

/// One preference compared to its registry default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceComparison {
    pub category: String,
    pub key: String,
    pub default_value: Value,
    pub current_value: Value,
    pub differs: bool,
}

/// Read-side audit over learning profiles.
pub struct PreferenceAuditService {
    profiles: Arc<LearningProfileService>,
}

impl PreferenceAuditService {
    pub fn new(profiles: Arc<LearningProfileService>) -> Self {
        Self { profiles }
    }

    pub async fn audit_summary(&self, agent: &str) -> AuditSummary {
        let profile = self.profiles.profile(agent).await;
        let comparisons = self.compare_to_defaults(agent).await;

        AuditSummary {
            agent_name: profile.agent_name.clone(),
            preference_count: profile.preferences.len(),
            changed_from_default: comparisons.iter().filter(|c| c.differs).count(),
            total_changes: profile.change_history.len(),
            total_feedback: profile.total_feedback_received,
            acceptance_rate: profile.overall_acceptance_rate,
            last_change_at: profile.change_history.last().map(|c| c.changed_at),
        }
    }

    /// Every registry-declared preference next to its current value.
    pub async fn compare_to_defaults(&self, agent: &str) -> Vec<PreferenceComparison> {
        let profile = self.profiles.profile(agent).await;
        let mut comparisons: Vec<PreferenceComparison> = self
            .profiles
            .registry()
            .definitions()
            .map(|definition| {
                let default_value = definition
                    .agent_defaults
                    .get(agent)
                    .cloned()
                    .unwrap_or_else(|| definition.default.clone());
                let current_value = profile
                    .preference(&definition.category, &definition.key)
                    .map(|p| p.value.clone())
                    .unwrap_or_else(|| default_value.clone());
                PreferenceComparison {
                    category: definition.category.clone(),
                    key: definition.key.clone(),
                    differs: current_value != default_value,
                    default_value,
                    current_value,
                }
            })
            .collect();
        comparisons.sort_by(|a, b| (&a.category, &a.key).cmp(&(&b.category, &b.key)));
        comparisons
    }

    pub async fn reset_preference_to_default(
        &self,
        agent: &str,
        category: &str,
        key: &str,
        reason: impl Into<String>,
    ) -> Result<PreferenceChange, LearningError> {
        self.profiles
            .reset_to_default(agent, category, key, Some(reason.into()))
            .await
    }

    /// Change history, optionally filtered to one preference.
    pub async fn change_history(
        &self,
        agent: &str,
        category: Option<&str>,
        key: Option<&str>,
    ) -> Vec<PreferenceChange> {
        let profile = self.profiles.profile(agent).await;
        profile
            .change_history
            .into_iter()
            .filter(|c| category.map(|cat| c.category == cat).unwrap_or(true))
            .filter(|c| key.map(|k| c.key == k).unwrap_or(true))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::PreferenceSource;
    use crate::repository::InMemoryLearningProfileRepository;
    use concord_registry::PreferenceRegistry;
    use serde_json::json;

    fn services() -> (Arc<LearningProfileService>, PreferenceAuditService) {
        let profiles = Arc::new(LearningProfileService::new(
            Arc::new(PreferenceRegistry::standard()),
            Arc::new(InMemoryLearningProfileRepository::new()),
        ));
        (profiles.clone(), PreferenceAuditService::new(profiles))
    }

    #[tokio::test]
    async fn test_compare_to_defaults_flags_changes() {
        let (profiles, audit) = services();
        profiles
            .set_preference(
                "Coach",
                "communication",
                "tone",
                json!("direct"),
                0.9,
                PreferenceSource::Manual,
                None,
            )
            .await
            .unwrap();

        let comparisons = audit.compare_to_defaults("Coach").await;
        let tone = comparisons
            .iter()
            .find(|c| c.category == "communication" && c.key == "tone")
            .unwrap();
        assert!(tone.differs);
        assert_eq!(tone.default_value, json!("encouraging"));
        assert_eq!(tone.current_value, json!("direct"));

        // Untouched preferences do not differ.
        assert!(comparisons
            .iter()
            .filter(|c| !(c.category == "communication" && c.key == "tone"))
            .all(|c| !c.differs));
    }

    #[tokio::test]
    async fn test_reset_restores_default() {
        let (profiles, audit) = services();
        profiles
            .set_preference(
                "Coach",
                "communication",
                "tone",
                json!("direct"),
                0.9,
                PreferenceSource::Manual,
                None,
            )
            .await
            .unwrap();

        audit
            .reset_preference_to_default("Coach", "communication", "tone", "operator reset")
            .await
            .unwrap();

        assert_eq!(
            profiles
                .preference_value("Coach", "communication", "tone")
                .await,
            Some(json!("encouraging"))
        );
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let (profiles, audit) = services();
        profiles
            .set_preference(
                "Coach",
                "communication",
                "tone",
                json!("neutral"),
                0.9,
                PreferenceSource::Manual,
                None,
            )
            .await
            .unwrap();
        profiles
            .set_preference(
                "Coach",
                "communication",
                "tone",
                json!("direct"),
                0.9,
                PreferenceSource::Manual,
                None,
            )
            .await
            .unwrap();

        let summary = audit.audit_summary("Coach").await;
        assert_eq!(summary.preference_count, 1);
        assert_eq!(summary.total_changes, 2);
        assert_eq!(summary.changed_from_default, 1);
        assert!(summary.last_change_at.is_some());
    }

    #[tokio::test]
    async fn test_change_history_filter() {
        let (profiles, audit) = services();
        profiles
            .set_preference(
                "Coach",
                "communication",
                "tone",
                json!("neutral"),
                0.9,
                PreferenceSource::Manual,
                None,
            )
            .await
            .unwrap();
        profiles
            .set_preference(
                "Coach",
                "logging",
                "detail_level",
                json!("verbose"),
                0.9,
                PreferenceSource::Manual,
                None,
            )
            .await
            .unwrap();

        let all = audit.change_history("Coach", None, None).await;
        assert_eq!(all.len(), 2);

        let tone_only = audit
            .change_history("Coach", Some("communication"), Some("tone"))
            .await;
        assert_eq!(tone_only.len(), 1);
    }
}
