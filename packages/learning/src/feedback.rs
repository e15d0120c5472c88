//! Feedback capture: user outcomes on decisions feed the learning loop.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use concord_governance::{DecisionOutcome, DecisionRecordRepository, GovernanceError};
use concord_observability::MetricsRegistry;

use crate::error::LearningError;
use crate::profile::FeedbackEntry;
use crate::suggestion::PreferenceSuggestionService;

/// Thresholds for the feedback loop.
#[derive(Debug, Clone)]
pub struct FeedbackCaptureConfig {
    /// Feedback entries per agent before suggestion analysis runs
    pub suggestion_threshold: u32,
    /// Run suggestion analysis automatically at the threshold
    pub auto_trigger: bool,
}

impl Default for FeedbackCaptureConfig {
    fn default() -> Self {
        Self {
            suggestion_threshold: 5,
            auto_trigger: true,
        }
    }
}

/// Input for one feedback capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackInput {
    pub decision_record_id: Uuid,
    pub user_accepted: bool,
    pub user_feedback: Option<String>,
    /// What actually happened after the decision, free-form
    pub actual_result: Option<String>,
    /// Extra context; `category`/`key`/`endorsed_value` entries are used to
    /// attribute the feedback to a preference area
    pub context: Option<Value>,
}

/// What one capture did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackCaptureOutcome {
    pub decision_id: Uuid,
    pub agent_name: String,
    pub suggestions_created: usize,
}

/// Records user outcomes and triggers suggestion analysis at the threshold.
pub struct FeedbackCaptureService {
    decisions: Arc<dyn DecisionRecordRepository>,
    suggestions: Arc<PreferenceSuggestionService>,
    metrics: Arc<MetricsRegistry>,
    config: FeedbackCaptureConfig,
    counters: Mutex<HashMap<String, u32>>,
}

impl FeedbackCaptureService {
    pub fn new(
        decisions: Arc<dyn DecisionRecordRepository>,
        suggestions: Arc<PreferenceSuggestionService>,
        metrics: Arc<MetricsRegistry>,
        config: FeedbackCaptureConfig,
    ) -> Self {
        Self {
            decisions,
            suggestions,
            metrics,
            config,
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Capture one user outcome. Missing decisions and repeated feedback
    /// surface as soft errors for the caller to map.
    pub async fn capture_feedback(
        &self,
        input: FeedbackInput,
    ) -> Result<FeedbackCaptureOutcome, LearningError> {
        let decision = self
            .decisions
            .get(input.decision_record_id)
            .await
            .ok_or(LearningError::DecisionNotFound(input.decision_record_id))?;

        let outcome = DecisionOutcome {
            user_accepted: Some(input.user_accepted),
            user_feedback: input.user_feedback.clone(),
            recorded_at: Utc::now(),
        };
        match self
            .decisions
            .record_outcome(decision.id, outcome)
            .await
        {
            Ok(_) => {}
            Err(GovernanceError::OutcomeAlreadyRecorded(id)) => {
                return Err(LearningError::FeedbackAlreadyRecorded(id));
            }
            Err(GovernanceError::DecisionNotFound(id)) => {
                return Err(LearningError::DecisionNotFound(id));
            }
            // record_outcome only produces the two variants above.
            Err(_) => return Err(LearningError::DecisionNotFound(decision.id)),
        }

        let (category, key, endorsed_value) =
            preference_hint(input.context.as_ref().unwrap_or(&decision.context));

        let entry = FeedbackEntry {
            id: Uuid::new_v4(),
            decision_id: decision.id,
            accepted: input.user_accepted,
            feedback: input.user_feedback,
            category,
            key,
            endorsed_value,
            recorded_at: Utc::now(),
        };
        self.suggestions
            .profiles()
            .record_feedback(&decision.agent_name, entry)
            .await;

        self.metrics.inc_counter(
            "feedback_captured_total",
            &[("agent", &decision.agent_name)],
        );

        let should_analyze = {
            let mut counters = self.counters.lock();
            let counter = counters.entry(decision.agent_name.clone()).or_insert(0);
            *counter += 1;
            if self.config.auto_trigger && *counter >= self.config.suggestion_threshold {
                *counter = 0;
                true
            } else {
                false
            }
        };

        let mut suggestions_created = 0;
        if should_analyze {
            suggestions_created = self
                .suggestions
                .analyze_feedback_and_suggest(&decision.agent_name)
                .await?
                .len();
        }

        Ok(FeedbackCaptureOutcome {
            decision_id: decision.id,
            agent_name: decision.agent_name,
            suggestions_created,
        })
    }

    /// Test hook: reset the per-agent counters.
    pub fn clear(&self) {
        self.counters.lock().clear();
    }
}

/// Pull a `(category, key, endorsed_value)` attribution out of decision or
/// feedback context, when present.
fn preference_hint(context: &Value) -> (Option<String>, Option<String>, Option<Value>) {
    let object = match context.as_object() {
        Some(object) => object,
        None => return (None, None, None),
    };
    let category = object.get("category").and_then(|v| v.as_str()).map(String::from);
    let key = object.get("key").and_then(|v| v.as_str()).map(String::from);
    let endorsed = object.get("endorsed_value").cloned();
    (category, key, endorsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryLearningProfileRepository;
    use crate::service::LearningProfileService;
    use crate::suggestion::SuggestionConfig;
    use concord_governance::{DecisionRecord, InMemoryDecisionRecordRepository, ReasoningSource};
    use concord_registry::PreferenceRegistry;
    use serde_json::json;

    struct Fixture {
        decisions: Arc<InMemoryDecisionRecordRepository>,
        profiles: Arc<LearningProfileService>,
        service: FeedbackCaptureService,
    }

    fn fixture(threshold: u32) -> Fixture {
        let decisions = Arc::new(InMemoryDecisionRecordRepository::new());
        let profiles = Arc::new(LearningProfileService::new(
            Arc::new(PreferenceRegistry::standard()),
            Arc::new(InMemoryLearningProfileRepository::new()),
        ));
        let suggestions = Arc::new(PreferenceSuggestionService::new(
            profiles.clone(),
            SuggestionConfig {
                min_feedback_for_suggestion: threshold as usize,
                min_suggestion_confidence: 0.6,
            },
        ));
        let service = FeedbackCaptureService::new(
            decisions.clone(),
            suggestions,
            Arc::new(MetricsRegistry::new()),
            FeedbackCaptureConfig {
                suggestion_threshold: threshold,
                auto_trigger: true,
            },
        );
        Fixture {
            decisions,
            profiles,
            service,
        }
    }

    async fn saved_decision(fixture: &Fixture) -> DecisionRecord {
        let record = DecisionRecord::new("Coach", "nudge", ReasoningSource::Rule, "keep going")
            .with_context(json!({
                "category": "communication",
                "key": "tone",
                "endorsed_value": "neutral",
            }));
        fixture.decisions.save(record.clone()).await;
        record
    }

    #[tokio::test]
    async fn test_missing_decision_soft_fails() {
        let f = fixture(5);
        let result = f
            .service
            .capture_feedback(FeedbackInput {
                decision_record_id: Uuid::new_v4(),
                user_accepted: true,
                user_feedback: None,
                actual_result: None,
                context: None,
            })
            .await;
        assert!(matches!(result, Err(LearningError::DecisionNotFound(_))));
    }

    #[tokio::test]
    async fn test_capture_records_outcome_and_profile_entry() {
        let f = fixture(5);
        let decision = saved_decision(&f).await;

        let outcome = f
            .service
            .capture_feedback(FeedbackInput {
                decision_record_id: decision.id,
                user_accepted: true,
                user_feedback: Some("liked it".to_string()),
                actual_result: None,
                context: None,
            })
            .await
            .unwrap();

        assert_eq!(outcome.agent_name, "Coach");
        assert_eq!(outcome.suggestions_created, 0);

        let stored = f.decisions.get(decision.id).await.unwrap();
        assert_eq!(stored.outcome.unwrap().user_accepted, Some(true));

        let profile = f.profiles.profile("Coach").await;
        assert_eq!(profile.feedback.len(), 1);
        assert_eq!(profile.feedback[0].endorsed_value, Some(json!("neutral")));
    }

    #[tokio::test]
    async fn test_second_feedback_on_same_decision_rejected() {
        let f = fixture(5);
        let decision = saved_decision(&f).await;
        let input = FeedbackInput {
            decision_record_id: decision.id,
            user_accepted: true,
            user_feedback: None,
            actual_result: None,
            context: None,
        };

        f.service.capture_feedback(input.clone()).await.unwrap();
        let second = f.service.capture_feedback(input).await;
        assert!(matches!(
            second,
            Err(LearningError::FeedbackAlreadyRecorded(_))
        ));
    }

    #[tokio::test]
    async fn test_threshold_triggers_suggestion_analysis() {
        let f = fixture(3);
        let mut last = None;
        for _ in 0..3 {
            let decision = saved_decision(&f).await;
            last = Some(
                f.service
                    .capture_feedback(FeedbackInput {
                        decision_record_id: decision.id,
                        user_accepted: true,
                        user_feedback: None,
                        actual_result: None,
                        context: None,
                    })
                    .await
                    .unwrap(),
            );
        }

        // The third capture crossed the threshold and produced a suggestion.
        assert_eq!(last.unwrap().suggestions_created, 1);
        let profile = f.profiles.profile("Coach").await;
        assert_eq!(profile.suggestions.len(), 1);
        assert_eq!(profile.suggestions[0].suggested_value, json!("neutral"));
    }
}
