//! Registry-validated profile mutations.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use concord_registry::PreferenceRegistry;

use crate::error::LearningError;
use crate::profile::{
    AgentLearningProfile, FeedbackEntry, PreferenceChange, PreferenceSource, SuggestedPreference,
    SuggestionStatus, UserPreference,
};
use crate::repository::LearningProfileRepository;

/// Every profile mutation in the plane goes through this service, so the
/// registry invariant ("no unvalidated value is ever persisted") holds by
/// construction.
pub struct LearningProfileService {
    registry: Arc<PreferenceRegistry>,
    profiles: Arc<dyn LearningProfileRepository>,
}

impl LearningProfileService {
    pub fn new(
        registry: Arc<PreferenceRegistry>,
        profiles: Arc<dyn LearningProfileRepository>,
    ) -> Self {
        Self { registry, profiles }
    }

    pub fn registry(&self) -> &PreferenceRegistry {
        &self.registry
    }

    pub async fn profile(&self, agent: &str) -> AgentLearningProfile {
        self.profiles.get_or_create(agent).await
    }

    /// Current value of a preference, when the agent has learned one.
    pub async fn preference_value(&self, agent: &str, category: &str, key: &str) -> Option<Value> {
        self.profiles
            .get(agent)
            .await
            .and_then(|p| p.preference(category, key).map(|pref| pref.value.clone()))
    }

    /// Current value, falling back to the registry default for this agent.
    pub async fn effective_value(&self, agent: &str, category: &str, key: &str) -> Option<Value> {
        match self.preference_value(agent, category, key).await {
            Some(value) => Some(value),
            None => self.registry.default_value_for_agent(agent, category, key),
        }
    }

    /// Validated preference write with change-history entry.
    pub async fn set_preference(
        &self,
        agent: &str,
        category: &str,
        key: &str,
        value: Value,
        confidence: f64,
        source: PreferenceSource,
        reason: Option<String>,
    ) -> Result<PreferenceChange, LearningError> {
        self.registry.validate(category, key, &value)?;

        let mut profile = self.profiles.get_or_create(agent).await;
        let previous = profile.put_preference(UserPreference {
            category: category.to_string(),
            key: key.to_string(),
            value: value.clone(),
            confidence,
            source,
            last_updated: Utc::now(),
        });

        let change = PreferenceChange {
            id: Uuid::new_v4(),
            category: category.to_string(),
            key: key.to_string(),
            previous_value: previous,
            new_value: value,
            source,
            reason,
            changed_at: Utc::now(),
        };
        profile.change_history.push(change.clone());
        self.profiles.save(profile).await;

        tracing::debug!(agent = %agent, preference = %format!("{category}.{key}"), "preference updated");
        Ok(change)
    }

    /// Reset a preference to its registry default (used by audit/rollback).
    pub async fn reset_to_default(
        &self,
        agent: &str,
        category: &str,
        key: &str,
        reason: Option<String>,
    ) -> Result<PreferenceChange, LearningError> {
        let default = self
            .registry
            .default_value_for_agent(agent, category, key)
            .ok_or_else(|| {
                LearningError::PreferenceNotFound {
                    agent: agent.to_string(),
                    key: format!("{category}.{key}"),
                }
            })?;
        self.set_preference(
            agent,
            category,
            key,
            default,
            1.0,
            PreferenceSource::Rollback,
            reason,
        )
        .await
    }

    pub async fn record_feedback(&self, agent: &str, entry: FeedbackEntry) {
        let mut profile = self.profiles.get_or_create(agent).await;
        profile.record_feedback(entry);
        self.profiles.save(profile).await;
    }

    /// Validated suggestion insertion.
    pub async fn add_suggestion(
        &self,
        agent: &str,
        suggestion: SuggestedPreference,
    ) -> Result<SuggestedPreference, LearningError> {
        self.registry.validate(
            &suggestion.category,
            &suggestion.key,
            &suggestion.suggested_value,
        )?;

        let mut profile = self.profiles.get_or_create(agent).await;
        profile.suggestions.push(suggestion.clone());
        self.profiles.save(profile).await;
        Ok(suggestion)
    }

    pub async fn suggestion(
        &self,
        agent: &str,
        id: Uuid,
    ) -> Result<SuggestedPreference, LearningError> {
        self.profiles
            .get(agent)
            .await
            .and_then(|p| p.suggestion(id).cloned())
            .ok_or_else(|| LearningError::SuggestionNotFound {
                agent: agent.to_string(),
                id,
            })
    }

    /// Transition a pending suggestion. Non-pending suggestions fail with
    /// `IllegalStatusTransition`.
    pub async fn transition_suggestion(
        &self,
        agent: &str,
        id: Uuid,
        status: SuggestionStatus,
        status_reason: Option<String>,
    ) -> Result<SuggestedPreference, LearningError> {
        let mut profile =
            self.profiles
                .get(agent)
                .await
                .ok_or_else(|| LearningError::SuggestionNotFound {
                    agent: agent.to_string(),
                    id,
                })?;

        let suggestion =
            profile
                .suggestion_mut(id)
                .ok_or_else(|| LearningError::SuggestionNotFound {
                    agent: agent.to_string(),
                    id,
                })?;

        if suggestion.status != SuggestionStatus::Pending {
            return Err(LearningError::IllegalStatusTransition { id });
        }
        suggestion.status = status;
        suggestion.status_reason = status_reason;
        let updated = suggestion.clone();

        self.profiles.save(profile).await;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryLearningProfileRepository;
    use serde_json::json;

    fn service() -> LearningProfileService {
        LearningProfileService::new(
            Arc::new(PreferenceRegistry::standard()),
            Arc::new(InMemoryLearningProfileRepository::new()),
        )
    }

    #[tokio::test]
    async fn test_set_preference_records_change() {
        let svc = service();
        let change = svc
            .set_preference(
                "Coach",
                "communication",
                "tone",
                json!("neutral"),
                0.9,
                PreferenceSource::Manual,
                Some("user asked".to_string()),
            )
            .await
            .unwrap();

        assert!(change.previous_value.is_none());
        assert_eq!(change.new_value, json!("neutral"));

        let profile = svc.profile("Coach").await;
        assert_eq!(profile.change_history.len(), 1);
        assert_eq!(
            profile.preference("communication", "tone").unwrap().value,
            json!("neutral")
        );
    }

    #[tokio::test]
    async fn test_invalid_value_rejected_and_not_persisted() {
        let svc = service();
        let result = svc
            .set_preference(
                "Coach",
                "communication",
                "tone",
                json!("yelling"),
                0.9,
                PreferenceSource::Manual,
                None,
            )
            .await;
        assert!(matches!(result, Err(LearningError::InvalidPreferenceValue(_))));

        let profile = svc.profile("Coach").await;
        assert!(profile.preference("communication", "tone").is_none());
        assert!(profile.change_history.is_empty());
    }

    #[tokio::test]
    async fn test_effective_value_falls_back_to_default() {
        let svc = service();
        assert_eq!(
            svc.effective_value("Coach", "communication", "tone").await,
            Some(json!("encouraging"))
        );
    }

    #[tokio::test]
    async fn test_transition_guards_pending_only() {
        let svc = service();
        let suggestion = svc
            .add_suggestion(
                "Coach",
                SuggestedPreference::new(
                    "communication",
                    "tone",
                    None,
                    json!("neutral"),
                    0.9,
                    "test",
                ),
            )
            .await
            .unwrap();

        svc.transition_suggestion(
            "Coach",
            suggestion.suggestion_id,
            SuggestionStatus::Approved,
            None,
        )
        .await
        .unwrap();

        let again = svc
            .transition_suggestion(
                "Coach",
                suggestion.suggestion_id,
                SuggestionStatus::Rejected,
                None,
            )
            .await;
        assert!(matches!(
            again,
            Err(LearningError::IllegalStatusTransition { .. })
        ));
    }
}
