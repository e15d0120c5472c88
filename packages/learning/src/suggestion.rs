//! Feedback-driven and manual preference suggestions.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::LearningError;
use crate::profile::{PreferenceSource, SuggestedPreference, SuggestionStatus};
use crate::service::LearningProfileService;

/// Thresholds for suggestion analysis.
#[derive(Debug, Clone)]
pub struct SuggestionConfig {
    /// Feedback entries an area needs before analysis considers it
    pub min_feedback_for_suggestion: usize,
    /// Confidence floor (majority share) for produced suggestions
    pub min_suggestion_confidence: f64,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        Self {
            min_feedback_for_suggestion: 5,
            min_suggestion_confidence: 0.6,
        }
    }
}

/// Turns accumulated feedback into preference suggestions.
pub struct PreferenceSuggestionService {
    profiles: Arc<LearningProfileService>,
    config: SuggestionConfig,
}

impl PreferenceSuggestionService {
    pub fn new(profiles: Arc<LearningProfileService>, config: SuggestionConfig) -> Self {
        Self { profiles, config }
    }

    pub fn profiles(&self) -> &Arc<LearningProfileService> {
        &self.profiles
    }

    /// Inspect the agent's feedback history and produce suggestions for
    /// areas where the majority-endorsed value differs from the current one.
    pub async fn analyze_feedback_and_suggest(
        &self,
        agent: &str,
    ) -> Result<Vec<SuggestedPreference>, LearningError> {
        let profile = self.profiles.profile(agent).await;

        // Tally endorsed values per (category, key) area.
        type AreaKey = (String, String);
        let mut votes: HashMap<AreaKey, Vec<(&Value, Uuid)>> = HashMap::new();
        for entry in &profile.feedback {
            if let (Some(category), Some(key), Some(value)) =
                (&entry.category, &entry.key, &entry.endorsed_value)
            {
                votes
                    .entry((category.clone(), key.clone()))
                    .or_default()
                    .push((value, entry.id));
            }
        }

        let mut created = Vec::new();
        for ((category, key), entries) in votes {
            if entries.len() < self.config.min_feedback_for_suggestion {
                continue;
            }
            if profile.has_pending_suggestion(&category, &key) {
                continue;
            }

            // Modal endorsed value and its share of the area's feedback.
            let mut counts: Vec<(&Value, usize, Vec<Uuid>)> = Vec::new();
            for (value, id) in entries.iter().copied() {
                if let Some(slot) = counts.iter_mut().find(|(v, _, _)| *v == value) {
                    slot.1 += 1;
                    slot.2.push(id);
                } else {
                    counts.push((value, 1, vec![id]));
                }
            }
            counts.sort_by(|a, b| b.1.cmp(&a.1));
            let (modal_value, modal_count, learned_from) = match counts.first() {
                Some((value, count, ids)) => ((*value).clone(), *count, ids.clone()),
                None => continue,
            };

            let confidence = modal_count as f64 / entries.len() as f64;
            if confidence < self.config.min_suggestion_confidence {
                continue;
            }

            let current = self.profiles.effective_value(agent, &category, &key).await;
            if current.as_ref() == Some(&modal_value) {
                continue;
            }

            // Registry-validated before insertion; out-of-domain endorsements
            // are dropped rather than suggested.
            if self
                .profiles
                .registry()
                .validate(&category, &key, &modal_value)
                .is_err()
            {
                tracing::warn!(
                    agent = %agent,
                    preference = %format!("{category}.{key}"),
                    "dropping suggestion with out-of-domain endorsed value"
                );
                continue;
            }

            let suggestion = SuggestedPreference::new(
                category.clone(),
                key.clone(),
                current,
                modal_value,
                confidence,
                format!(
                    "{} of {} recent feedback entries endorsed this value",
                    modal_count,
                    entries.len()
                ),
            )
            .learned_from(learned_from);

            let stored = self.profiles.add_suggestion(agent, suggestion).await?;
            tracing::info!(
                agent = %agent,
                suggestion_id = %stored.suggestion_id,
                preference = %format!("{category}.{key}"),
                "suggestion created from feedback"
            );
            created.push(stored);
        }

        Ok(created)
    }

    /// Operator-created suggestion. Same validation as analysis output.
    pub async fn create_manual_suggestion(
        &self,
        agent: &str,
        category: &str,
        key: &str,
        value: Value,
        reason: impl Into<String>,
        confidence: Option<f64>,
    ) -> Result<SuggestedPreference, LearningError> {
        self.profiles.registry().validate(category, key, &value)?;
        let current = self.profiles.effective_value(agent, category, key).await;
        let suggestion = SuggestedPreference::new(
            category,
            key,
            current,
            value,
            confidence.unwrap_or(0.8),
            reason,
        );
        self.profiles.add_suggestion(agent, suggestion).await
    }

    /// Approve: write the preference, mark the suggestion approved.
    pub async fn approve_suggestion(
        &self,
        agent: &str,
        id: Uuid,
    ) -> Result<SuggestedPreference, LearningError> {
        let suggestion = self
            .profiles
            .transition_suggestion(agent, id, SuggestionStatus::Approved, None)
            .await?;
        self.profiles
            .set_preference(
                agent,
                &suggestion.category,
                &suggestion.key,
                suggestion.suggested_value.clone(),
                suggestion.confidence,
                PreferenceSource::Suggestion,
                Some(format!("suggestion {id} approved")),
            )
            .await?;
        Ok(suggestion)
    }

    pub async fn reject_suggestion(
        &self,
        agent: &str,
        id: Uuid,
        reason: impl Into<String>,
    ) -> Result<SuggestedPreference, LearningError> {
        self.profiles
            .transition_suggestion(agent, id, SuggestionStatus::Rejected, Some(reason.into()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::FeedbackEntry;
    use crate::repository::InMemoryLearningProfileRepository;
    use chrono::Utc;
    use concord_registry::PreferenceRegistry;
    use serde_json::json;

    fn service() -> PreferenceSuggestionService {
        let profiles = Arc::new(LearningProfileService::new(
            Arc::new(PreferenceRegistry::standard()),
            Arc::new(InMemoryLearningProfileRepository::new()),
        ));
        PreferenceSuggestionService::new(profiles, SuggestionConfig::default())
    }

    fn tone_feedback(value: &str, accepted: bool) -> FeedbackEntry {
        FeedbackEntry {
            id: Uuid::new_v4(),
            decision_id: Uuid::new_v4(),
            accepted,
            feedback: None,
            category: Some("communication".to_string()),
            key: Some("tone".to_string()),
            endorsed_value: Some(json!(value)),
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_majority_feedback_produces_suggestion() {
        let svc = service();
        for _ in 0..4 {
            svc.profiles
                .record_feedback("Coach", tone_feedback("neutral", true))
                .await;
        }
        svc.profiles
            .record_feedback("Coach", tone_feedback("encouraging", true))
            .await;

        let created = svc.analyze_feedback_and_suggest("Coach").await.unwrap();
        assert_eq!(created.len(), 1);
        let suggestion = &created[0];
        assert_eq!(suggestion.suggested_value, json!("neutral"));
        assert!((suggestion.confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(suggestion.learned_from.len(), 4);
    }

    #[tokio::test]
    async fn test_too_little_feedback_produces_nothing() {
        let svc = service();
        for _ in 0..3 {
            svc.profiles
                .record_feedback("Coach", tone_feedback("neutral", true))
                .await;
        }
        let created = svc.analyze_feedback_and_suggest("Coach").await.unwrap();
        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn test_majority_matching_current_produces_nothing() {
        let svc = service();
        // "encouraging" is already the registry default.
        for _ in 0..5 {
            svc.profiles
                .record_feedback("Coach", tone_feedback("encouraging", true))
                .await;
        }
        let created = svc.analyze_feedback_and_suggest("Coach").await.unwrap();
        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn test_no_duplicate_pending_suggestion() {
        let svc = service();
        for _ in 0..5 {
            svc.profiles
                .record_feedback("Coach", tone_feedback("neutral", true))
                .await;
        }
        let first = svc.analyze_feedback_and_suggest("Coach").await.unwrap();
        assert_eq!(first.len(), 1);

        let second = svc.analyze_feedback_and_suggest("Coach").await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_manual_suggestion_validates_value() {
        let svc = service();
        let err = svc
            .create_manual_suggestion(
                "Coach",
                "communication",
                "tone",
                json!("shouting"),
                "operator request",
                None,
            )
            .await;
        assert!(matches!(err, Err(LearningError::InvalidPreferenceValue(_))));
    }

    #[tokio::test]
    async fn test_approve_writes_preference() {
        let svc = service();
        let suggestion = svc
            .create_manual_suggestion(
                "Coach",
                "communication",
                "tone",
                json!("direct"),
                "operator request",
                Some(0.9),
            )
            .await
            .unwrap();

        svc.approve_suggestion("Coach", suggestion.suggestion_id)
            .await
            .unwrap();

        assert_eq!(
            svc.profiles
                .preference_value("Coach", "communication", "tone")
                .await,
            Some(json!("direct"))
        );
    }

    #[tokio::test]
    async fn test_reject_keeps_preference_unchanged() {
        let svc = service();
        let suggestion = svc
            .create_manual_suggestion(
                "Coach",
                "communication",
                "tone",
                json!("direct"),
                "operator request",
                None,
            )
            .await
            .unwrap();

        svc.reject_suggestion("Coach", suggestion.suggestion_id, "not wanted")
            .await
            .unwrap();

        assert!(svc
            .profiles
            .preference_value("Coach", "communication", "tone")
            .await
            .is_none());
    }
}
