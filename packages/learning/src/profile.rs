//! Profile records: preferences, feedback, suggestions, change history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Where a preference value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceSource {
    /// Registry default
    Default,
    /// Set manually by the user or an administrator
    Manual,
    /// Approved suggestion
    Suggestion,
    /// Applied by the auto-adaptation engine
    AutoAdapted,
    /// Restored by a rollback
    Rollback,
}

/// One learned preference value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreference {
    pub category: String,
    pub key: String,
    pub value: Value,
    pub confidence: f64,
    pub source: PreferenceSource,
    pub last_updated: DateTime<Utc>,
}

/// A user reaction to one decision, optionally endorsing a preference value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: Uuid,
    pub decision_id: Uuid,
    pub accepted: bool,
    pub feedback: Option<String>,
    /// Preference area this feedback speaks to, when derivable
    pub category: Option<String>,
    pub key: Option<String>,
    /// The value this feedback endorses for the area
    pub endorsed_value: Option<Value>,
    pub recorded_at: DateTime<Utc>,
}

/// Suggestion lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
}

/// A proposed preference change awaiting approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedPreference {
    pub suggestion_id: Uuid,
    pub category: String,
    pub key: String,
    pub current_value: Option<Value>,
    pub suggested_value: Value,
    pub confidence: f64,
    pub reason: String,
    /// Feedback entries this suggestion was learned from
    pub learned_from: Vec<Uuid>,
    pub suggested_at: DateTime<Utc>,
    pub status: SuggestionStatus,
    /// Rejection reason, when rejected
    pub status_reason: Option<String>,
}

impl SuggestedPreference {
    pub fn new(
        category: impl Into<String>,
        key: impl Into<String>,
        current_value: Option<Value>,
        suggested_value: Value,
        confidence: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            suggestion_id: Uuid::new_v4(),
            category: category.into(),
            key: key.into(),
            current_value,
            suggested_value,
            confidence,
            reason: reason.into(),
            learned_from: Vec::new(),
            suggested_at: Utc::now(),
            status: SuggestionStatus::Pending,
            status_reason: None,
        }
    }

    pub fn learned_from(mut self, feedback_ids: Vec<Uuid>) -> Self {
        self.learned_from = feedback_ids;
        self
    }
}

/// One entry in the preference change history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceChange {
    pub id: Uuid,
    pub category: String,
    pub key: String,
    pub previous_value: Option<Value>,
    pub new_value: Value,
    pub source: PreferenceSource,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Everything one agent has learned, keyed by agent name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLearningProfile {
    pub agent_name: String,
    pub preferences: Vec<UserPreference>,
    pub feedback: Vec<FeedbackEntry>,
    pub suggestions: Vec<SuggestedPreference>,
    pub change_history: Vec<PreferenceChange>,
    pub total_feedback_received: u64,
    pub overall_acceptance_rate: f64,
}

impl AgentLearningProfile {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            preferences: Vec::new(),
            feedback: Vec::new(),
            suggestions: Vec::new(),
            change_history: Vec::new(),
            total_feedback_received: 0,
            overall_acceptance_rate: 0.0,
        }
    }

    pub fn preference(&self, category: &str, key: &str) -> Option<&UserPreference> {
        self.preferences
            .iter()
            .find(|p| p.category == category && p.key == key)
    }

    pub fn suggestion(&self, id: Uuid) -> Option<&SuggestedPreference> {
        self.suggestions.iter().find(|s| s.suggestion_id == id)
    }

    pub fn suggestion_mut(&mut self, id: Uuid) -> Option<&mut SuggestedPreference> {
        self.suggestions.iter_mut().find(|s| s.suggestion_id == id)
    }

    /// Is there a pending suggestion for this area already?
    pub fn has_pending_suggestion(&self, category: &str, key: &str) -> bool {
        self.suggestions.iter().any(|s| {
            s.status == SuggestionStatus::Pending && s.category == category && s.key == key
        })
    }

    /// Append feedback and refresh the acceptance counters.
    pub fn record_feedback(&mut self, entry: FeedbackEntry) {
        self.feedback.push(entry);
        self.total_feedback_received += 1;
        let accepted = self.feedback.iter().filter(|f| f.accepted).count();
        self.overall_acceptance_rate = accepted as f64 / self.feedback.len() as f64;
    }

    /// Upsert a preference value, returning the previous value.
    pub fn put_preference(&mut self, preference: UserPreference) -> Option<Value> {
        if let Some(existing) = self
            .preferences
            .iter_mut()
            .find(|p| p.category == preference.category && p.key == preference.key)
        {
            let previous = existing.value.clone();
            *existing = preference;
            Some(previous)
        } else {
            self.preferences.push(preference);
            None
        }
    }

    pub fn remove_preference(&mut self, category: &str, key: &str) -> Option<UserPreference> {
        let position = self
            .preferences
            .iter()
            .position(|p| p.category == category && p.key == key)?;
        Some(self.preferences.remove(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_feedback_updates_rate() {
        let mut profile = AgentLearningProfile::new("Coach");
        for accepted in [true, true, false, true] {
            profile.record_feedback(FeedbackEntry {
                id: Uuid::new_v4(),
                decision_id: Uuid::new_v4(),
                accepted,
                feedback: None,
                category: None,
                key: None,
                endorsed_value: None,
                recorded_at: Utc::now(),
            });
        }
        assert_eq!(profile.total_feedback_received, 4);
        assert!((profile.overall_acceptance_rate - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_put_preference_returns_previous() {
        let mut profile = AgentLearningProfile::new("Coach");
        let first = UserPreference {
            category: "communication".to_string(),
            key: "tone".to_string(),
            value: json!("neutral"),
            confidence: 0.8,
            source: PreferenceSource::Manual,
            last_updated: Utc::now(),
        };
        assert!(profile.put_preference(first.clone()).is_none());

        let mut second = first;
        second.value = json!("direct");
        assert_eq!(profile.put_preference(second), Some(json!("neutral")));
        assert_eq!(profile.preferences.len(), 1);
    }

    #[test]
    fn test_pending_suggestion_lookup() {
        let mut profile = AgentLearningProfile::new("Coach");
        profile.suggestions.push(SuggestedPreference::new(
            "communication",
            "tone",
            None,
            json!("neutral"),
            0.9,
            "majority feedback",
        ));
        assert!(profile.has_pending_suggestion("communication", "tone"));
        assert!(!profile.has_pending_suggestion("communication", "verbosity"));
    }
}
