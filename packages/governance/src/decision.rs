//! Decision records: what each agent decided, from which reasoning source.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::GovernanceError;
use crate::llm::TokenUsage;

/// Where the decision content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningSource {
    /// Deterministic rule
    Rule,
    /// Heuristic computation
    Heuristic,
    /// Language-model generation
    Llm,
    /// Rule fallback substituted for a failed/low-confidence generation
    Fallback,
}

/// AI call metadata attached when the LLM produced the content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiMetadata {
    pub model: String,
    pub confidence: f64,
    pub tokens: TokenUsage,
    pub cost_usd: f64,
    pub latency_ms: u64,
}

/// User outcome on a decision. Set at most once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionOutcome {
    /// Did the user accept the decision? `None` means "seen, undecided".
    pub user_accepted: Option<bool>,
    pub user_feedback: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Record of one agent decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub agent_name: String,
    pub triggering_event_type: String,
    pub triggering_event_id: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub decision_type: String,
    pub reasoning_source: ReasoningSource,
    pub decision_content: String,
    /// Present when AI produced (or attempted) the content
    pub ai: Option<AiMetadata>,
    /// User outcome, set at most once via the repository
    pub outcome: Option<DecisionOutcome>,
    /// Context the decision was made with (used by feedback analysis)
    #[serde(default)]
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl DecisionRecord {
    pub fn new(
        agent_name: impl Into<String>,
        decision_type: impl Into<String>,
        reasoning_source: ReasoningSource,
        decision_content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_name: agent_name.into(),
            triggering_event_type: String::new(),
            triggering_event_id: String::new(),
            aggregate_type: String::new(),
            aggregate_id: String::new(),
            decision_type: decision_type.into(),
            reasoning_source,
            decision_content: decision_content.into(),
            ai: None,
            outcome: None,
            context: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    pub fn with_trigger(
        mut self,
        event_type: impl Into<String>,
        event_id: impl Into<String>,
    ) -> Self {
        self.triggering_event_type = event_type.into();
        self.triggering_event_id = event_id.into();
        self
    }

    pub fn with_aggregate(
        mut self,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
    ) -> Self {
        self.aggregate_type = aggregate_type.into();
        self.aggregate_id = aggregate_id.into();
        self
    }

    pub fn with_ai(mut self, ai: AiMetadata) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// Storage port for decision records.
#[async_trait]
pub trait DecisionRecordRepository: Send + Sync {
    async fn save(&self, record: DecisionRecord);

    async fn get(&self, id: Uuid) -> Option<DecisionRecord>;

    /// Record the user outcome. Fails if the decision is unknown or the
    /// outcome was already recorded.
    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: DecisionOutcome,
    ) -> Result<DecisionRecord, GovernanceError>;

    async fn list_by_agent(&self, agent: &str) -> Vec<DecisionRecord>;

    async fn list_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<DecisionRecord>;
}

/// In-memory decision store, insertion-ordered.
#[derive(Default)]
pub struct InMemoryDecisionRecordRepository {
    records: RwLock<Vec<DecisionRecord>>,
    index: RwLock<HashMap<Uuid, usize>>,
}

impl InMemoryDecisionRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook.
    pub async fn clear(&self) {
        self.records.write().await.clear();
        self.index.write().await.clear();
    }
}

#[async_trait]
impl DecisionRecordRepository for InMemoryDecisionRecordRepository {
    async fn save(&self, record: DecisionRecord) {
        let mut records = self.records.write().await;
        let mut index = self.index.write().await;
        if let Some(&position) = index.get(&record.id) {
            records[position] = record;
        } else {
            index.insert(record.id, records.len());
            records.push(record);
        }
    }

    async fn get(&self, id: Uuid) -> Option<DecisionRecord> {
        let index = self.index.read().await;
        let position = *index.get(&id)?;
        self.records.read().await.get(position).cloned()
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        outcome: DecisionOutcome,
    ) -> Result<DecisionRecord, GovernanceError> {
        let index = self.index.read().await;
        let position = *index
            .get(&id)
            .ok_or(GovernanceError::DecisionNotFound(id))?;
        let mut records = self.records.write().await;
        let record = &mut records[position];
        if record.outcome.is_some() {
            return Err(GovernanceError::OutcomeAlreadyRecorded(id));
        }
        record.outcome = Some(outcome);
        Ok(record.clone())
    }

    async fn list_by_agent(&self, agent: &str) -> Vec<DecisionRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.agent_name == agent)
            .cloned()
            .collect()
    }

    async fn list_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<DecisionRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| r.created_at >= since && r.created_at <= until)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> DecisionRecord {
        DecisionRecord::new("Coach", "nudge", ReasoningSource::Rule, "keep going")
            .with_trigger("habit.completed", "evt-1")
            .with_aggregate("user", "user-1")
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let repo = InMemoryDecisionRecordRepository::new();
        let record = sample_record();
        let id = record.id;
        repo.save(record).await;

        let loaded = repo.get(id).await.unwrap();
        assert_eq!(loaded.agent_name, "Coach");
        assert_eq!(loaded.reasoning_source, ReasoningSource::Rule);
    }

    #[tokio::test]
    async fn test_outcome_recorded_once() {
        let repo = InMemoryDecisionRecordRepository::new();
        let record = sample_record();
        let id = record.id;
        repo.save(record).await;

        let outcome = DecisionOutcome {
            user_accepted: Some(true),
            user_feedback: None,
            recorded_at: Utc::now(),
        };
        repo.record_outcome(id, outcome.clone()).await.unwrap();

        let second = repo.record_outcome(id, outcome).await;
        assert!(matches!(
            second,
            Err(GovernanceError::OutcomeAlreadyRecorded(_))
        ));
    }

    #[tokio::test]
    async fn test_outcome_on_missing_decision() {
        let repo = InMemoryDecisionRecordRepository::new();
        let result = repo
            .record_outcome(
                Uuid::new_v4(),
                DecisionOutcome {
                    user_accepted: Some(false),
                    user_feedback: None,
                    recorded_at: Utc::now(),
                },
            )
            .await;
        assert!(matches!(result, Err(GovernanceError::DecisionNotFound(_))));
    }

    #[tokio::test]
    async fn test_list_by_agent() {
        let repo = InMemoryDecisionRecordRepository::new();
        repo.save(sample_record()).await;
        repo.save(DecisionRecord::new(
            "Planner",
            "reschedule",
            ReasoningSource::Heuristic,
            "move to 9am",
        ))
        .await;

        assert_eq!(repo.list_by_agent("Coach").await.len(), 1);
        assert_eq!(repo.list_by_agent("Planner").await.len(), 1);
        assert!(repo.list_by_agent("Logger").await.is_empty());
    }
}
