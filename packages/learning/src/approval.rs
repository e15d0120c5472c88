//! Suggestion approval with domain events.

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use concord_events::{event_types, DomainEvent, EventBus};

use crate::error::LearningError;
use crate::profile::SuggestedPreference;
use crate::suggestion::PreferenceSuggestionService;

/// Approve/reject pending suggestions, announcing the outcome on the bus.
pub struct SuggestionApprovalService {
    suggestions: Arc<PreferenceSuggestionService>,
    bus: Arc<EventBus>,
}

impl SuggestionApprovalService {
    pub fn new(suggestions: Arc<PreferenceSuggestionService>, bus: Arc<EventBus>) -> Self {
        Self { suggestions, bus }
    }

    pub async fn approve(
        &self,
        agent: &str,
        id: Uuid,
        correlation_id: Option<&str>,
    ) -> Result<SuggestedPreference, LearningError> {
        let suggestion = self.suggestions.approve_suggestion(agent, id).await?;

        let mut event = DomainEvent::new(
            event_types::SUGGESTION_APPROVED,
            "suggestion",
            id.to_string(),
            json!({
                "agent": agent,
                "category": suggestion.category,
                "key": suggestion.key,
                "value": suggestion.suggested_value,
            }),
        );
        if let Some(correlation_id) = correlation_id {
            event = event.with_correlation_id(correlation_id);
        }
        self.bus.dispatch(event).await;

        tracing::info!(agent = %agent, suggestion_id = %id, "suggestion approved");
        Ok(suggestion)
    }

    pub async fn reject(
        &self,
        agent: &str,
        id: Uuid,
        reason: &str,
        correlation_id: Option<&str>,
    ) -> Result<SuggestedPreference, LearningError> {
        let suggestion = self.suggestions.reject_suggestion(agent, id, reason).await?;

        let mut event = DomainEvent::new(
            event_types::SUGGESTION_REJECTED,
            "suggestion",
            id.to_string(),
            json!({
                "agent": agent,
                "category": suggestion.category,
                "key": suggestion.key,
                "reason": reason,
            }),
        );
        if let Some(correlation_id) = correlation_id {
            event = event.with_correlation_id(correlation_id);
        }
        self.bus.dispatch(event).await;

        tracing::info!(agent = %agent, suggestion_id = %id, reason = %reason, "suggestion rejected");
        Ok(suggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryLearningProfileRepository;
    use crate::service::LearningProfileService;
    use crate::suggestion::SuggestionConfig;
    use concord_events::RecordingHandler;
    use concord_registry::PreferenceRegistry;
    use serde_json::json;

    async fn fixture() -> (SuggestionApprovalService, Arc<PreferenceSuggestionService>, Arc<RecordingHandler>) {
        let profiles = Arc::new(LearningProfileService::new(
            Arc::new(PreferenceRegistry::standard()),
            Arc::new(InMemoryLearningProfileRepository::new()),
        ));
        let suggestions = Arc::new(PreferenceSuggestionService::new(
            profiles,
            SuggestionConfig::default(),
        ));
        let bus = Arc::new(EventBus::new());
        let recorder = RecordingHandler::new();
        bus.subscribe_all(recorder.clone()).await;
        (
            SuggestionApprovalService::new(suggestions.clone(), bus),
            suggestions,
            recorder,
        )
    }

    #[tokio::test]
    async fn test_approve_emits_event() {
        let (approval, suggestions, recorder) = fixture().await;
        let suggestion = suggestions
            .create_manual_suggestion(
                "Coach",
                "communication",
                "tone",
                json!("neutral"),
                "test",
                None,
            )
            .await
            .unwrap();

        approval
            .approve("Coach", suggestion.suggestion_id, Some("corr-1"))
            .await
            .unwrap();

        assert_eq!(recorder.count_of(event_types::SUGGESTION_APPROVED), 1);
        let event = &recorder.events()[0];
        assert_eq!(event.correlation_id.as_deref(), Some("corr-1"));
    }

    #[tokio::test]
    async fn test_reject_emits_event_once() {
        let (approval, suggestions, recorder) = fixture().await;
        let suggestion = suggestions
            .create_manual_suggestion(
                "Coach",
                "communication",
                "tone",
                json!("neutral"),
                "test",
                None,
            )
            .await
            .unwrap();

        approval
            .reject("Coach", suggestion.suggestion_id, "no thanks", None)
            .await
            .unwrap();

        assert_eq!(recorder.count_of(event_types::SUGGESTION_REJECTED), 1);

        // Second reject fails the status guard and emits nothing further.
        let again = approval
            .reject("Coach", suggestion.suggestion_id, "no thanks", None)
            .await;
        assert!(again.is_err());
        assert_eq!(recorder.count_of(event_types::SUGGESTION_REJECTED), 1);
    }
}
