//! Auto-adaptation attempts: the ledger of every evaluation outcome.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use concord_registry::RiskLevel;

use crate::error::AdaptationError;
use crate::policy::{AdaptationMode, AdaptationPolicy};

/// Why an evaluation blocked (first failing check wins), or why a
/// suggestion was skipped. Evaluation itself never returns
/// `PreferenceAlreadyAtSuggestedValue`; that reason belongs to the
/// engine's skip short-circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    PreferenceNotAdaptive,
    UserNotOptedIn,
    ModeIsManual,
    PreferenceLocked,
    RiskLevelNotAllowed,
    CooldownNotElapsed,
    RateLimitExceeded,
    ConfidenceTooLow,
    PreferenceAlreadyAtSuggestedValue,
}

impl BlockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreferenceNotAdaptive => "preference_not_adaptive",
            Self::UserNotOptedIn => "user_not_opted_in",
            Self::ModeIsManual => "mode_is_manual",
            Self::PreferenceLocked => "preference_locked",
            Self::RiskLevelNotAllowed => "risk_level_not_allowed",
            Self::CooldownNotElapsed => "cooldown_not_elapsed",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::ConfidenceTooLow => "confidence_too_low",
            Self::PreferenceAlreadyAtSuggestedValue => "preference_already_at_suggested_value",
        }
    }
}

/// Terminal result of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptResult {
    Applied,
    Blocked,
    Skipped,
}

/// The policy fields that decided an attempt, frozen at decision time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub mode: AdaptationMode,
    pub user_opted_in: bool,
    pub min_confidence: f64,
    pub allowed_risk_levels: Vec<RiskLevel>,
}

impl PolicySnapshot {
    pub fn of(policy: &AdaptationPolicy) -> Self {
        Self {
            mode: policy.mode,
            user_opted_in: policy.user_opted_in,
            min_confidence: policy.min_confidence,
            allowed_risk_levels: policy.allowed_risk_levels.clone(),
        }
    }
}

/// Record of one auto-adaptation evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoAdaptationAttempt {
    pub id: Uuid,
    pub agent_name: String,
    pub suggestion_id: Uuid,
    pub category: String,
    pub key: String,
    /// Explicit profile value before the attempt; `None` means "was at
    /// registry default"
    pub previous_value: Option<Value>,
    pub suggested_value: Value,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub result: AttemptResult,
    pub block_reason: Option<BlockReason>,
    pub policy_id: Uuid,
    pub policy_snapshot: PolicySnapshot,
    pub timestamp: DateTime<Utc>,
    pub rolled_back: bool,
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub rollback_reason: Option<String>,
}

/// Storage port for attempts. Reads preserve insertion order.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    async fn save(&self, attempt: AutoAdaptationAttempt);

    async fn get(&self, id: Uuid) -> Option<AutoAdaptationAttempt>;

    async fn list_by_agent(&self, agent: &str) -> Vec<AutoAdaptationAttempt>;

    async fn list_all(&self) -> Vec<AutoAdaptationAttempt>;

    async fn list_by_suggestion(&self, suggestion_id: Uuid) -> Vec<AutoAdaptationAttempt>;

    /// Most recent applied, not-rolled-back attempt for a preference.
    async fn find_last_applied(
        &self,
        agent: &str,
        category: &str,
        key: &str,
    ) -> Option<AutoAdaptationAttempt>;

    async fn mark_rolled_back(
        &self,
        id: Uuid,
        reason: &str,
    ) -> Result<AutoAdaptationAttempt, AdaptationError>;

    async fn list_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<AutoAdaptationAttempt>;
}

/// In-memory attempt ledger, insertion-ordered (linearized per process).
#[derive(Default)]
pub struct InMemoryAttemptRepository {
    attempts: RwLock<Vec<AutoAdaptationAttempt>>,
}

impl InMemoryAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn clear(&self) {
        self.attempts.write().await.clear();
    }
}

#[async_trait]
impl AttemptRepository for InMemoryAttemptRepository {
    async fn save(&self, attempt: AutoAdaptationAttempt) {
        let mut attempts = self.attempts.write().await;
        if let Some(existing) = attempts.iter_mut().find(|a| a.id == attempt.id) {
            *existing = attempt;
        } else {
            attempts.push(attempt);
        }
    }

    async fn get(&self, id: Uuid) -> Option<AutoAdaptationAttempt> {
        self.attempts.read().await.iter().find(|a| a.id == id).cloned()
    }

    async fn list_by_agent(&self, agent: &str) -> Vec<AutoAdaptationAttempt> {
        self.attempts
            .read()
            .await
            .iter()
            .filter(|a| a.agent_name == agent)
            .cloned()
            .collect()
    }

    async fn list_all(&self) -> Vec<AutoAdaptationAttempt> {
        self.attempts.read().await.clone()
    }

    async fn list_by_suggestion(&self, suggestion_id: Uuid) -> Vec<AutoAdaptationAttempt> {
        self.attempts
            .read()
            .await
            .iter()
            .filter(|a| a.suggestion_id == suggestion_id)
            .cloned()
            .collect()
    }

    async fn find_last_applied(
        &self,
        agent: &str,
        category: &str,
        key: &str,
    ) -> Option<AutoAdaptationAttempt> {
        self.attempts
            .read()
            .await
            .iter()
            .rev()
            .find(|a| {
                a.agent_name == agent
                    && a.category == category
                    && a.key == key
                    && a.result == AttemptResult::Applied
                    && !a.rolled_back
            })
            .cloned()
    }

    async fn mark_rolled_back(
        &self,
        id: Uuid,
        reason: &str,
    ) -> Result<AutoAdaptationAttempt, AdaptationError> {
        let mut attempts = self.attempts.write().await;
        let attempt = attempts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(AdaptationError::AttemptNotFound(id))?;
        attempt.rolled_back = true;
        attempt.rolled_back_at = Some(Utc::now());
        attempt.rollback_reason = Some(reason.to_string());
        Ok(attempt.clone())
    }

    async fn list_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<AutoAdaptationAttempt> {
        self.attempts
            .read()
            .await
            .iter()
            .filter(|a| a.timestamp >= since && a.timestamp <= until)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attempt(agent: &str, result: AttemptResult) -> AutoAdaptationAttempt {
        let policy = AdaptationPolicy::default_for(agent);
        AutoAdaptationAttempt {
            id: Uuid::new_v4(),
            agent_name: agent.to_string(),
            suggestion_id: Uuid::new_v4(),
            category: "communication".to_string(),
            key: "tone".to_string(),
            previous_value: None,
            suggested_value: json!("neutral"),
            confidence: 0.9,
            risk_level: RiskLevel::Low,
            result,
            block_reason: None,
            policy_id: policy.id,
            policy_snapshot: PolicySnapshot::of(&policy),
            timestamp: Utc::now(),
            rolled_back: false,
            rolled_back_at: None,
            rollback_reason: None,
        }
    }

    #[tokio::test]
    async fn test_insertion_order_preserved() {
        let repo = InMemoryAttemptRepository::new();
        let first = attempt("Coach", AttemptResult::Blocked);
        let second = attempt("Coach", AttemptResult::Applied);
        repo.save(first.clone()).await;
        repo.save(second.clone()).await;

        let listed = repo.list_by_agent("Coach").await;
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
    }

    #[tokio::test]
    async fn test_find_last_applied_skips_rolled_back() {
        let repo = InMemoryAttemptRepository::new();
        let applied = attempt("Coach", AttemptResult::Applied);
        repo.save(applied.clone()).await;

        assert_eq!(
            repo.find_last_applied("Coach", "communication", "tone")
                .await
                .unwrap()
                .id,
            applied.id
        );

        repo.mark_rolled_back(applied.id, "test").await.unwrap();
        assert!(repo
            .find_last_applied("Coach", "communication", "tone")
            .await
            .is_none());
    }

    #[test]
    fn test_block_reason_wire_strings() {
        assert_eq!(BlockReason::UserNotOptedIn.as_str(), "user_not_opted_in");
        assert_eq!(BlockReason::RateLimitExceeded.as_str(), "rate_limit_exceeded");
        assert_eq!(
            serde_json::to_value(BlockReason::CooldownNotElapsed).unwrap(),
            json!("cooldown_not_elapsed")
        );
    }
}
