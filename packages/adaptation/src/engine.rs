//! The auto-adaptation engine: suggestion in, attempt (or proposal) out.

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use concord_arbiter::{AgentProposalService, ProposalInput, TargetRef};
use concord_events::{event_types, DomainEvent, EventBus};
use concord_learning::{
    LearningProfileService, PreferenceSource, SuggestedPreference, SuggestionStatus,
};
use concord_observability::MetricsRegistry;
use concord_registry::{PreferenceRegistry, RiskLevel};

use crate::attempt::{
    AttemptRepository, AttemptResult, AutoAdaptationAttempt, BlockReason, PolicySnapshot,
};
use crate::error::AdaptationError;
use crate::policy_service::AdaptationPolicyService;

/// What processing one suggestion did.
#[derive(Debug, Clone)]
pub enum ProcessOutcome {
    Applied(AutoAdaptationAttempt),
    Blocked(AutoAdaptationAttempt),
    Skipped(AutoAdaptationAttempt),
    /// Arbitration mode: the change was submitted as a proposal instead of
    /// applied directly; no attempt is recorded until arbitration settles.
    Proposed { proposal_id: Uuid },
}

/// Policy-gated application of suggestions.
pub struct AutoAdaptationEngine {
    registry: Arc<PreferenceRegistry>,
    profiles: Arc<LearningProfileService>,
    policy_service: Arc<AdaptationPolicyService>,
    attempts: Arc<dyn AttemptRepository>,
    bus: Arc<EventBus>,
    metrics: Arc<MetricsRegistry>,
    proposal_service: Option<Arc<AgentProposalService>>,
    // Per-agent exclusive section: evaluate + apply + rate-limit tick must
    // not interleave for the same agent.
    agent_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AutoAdaptationEngine {
    pub fn new(
        registry: Arc<PreferenceRegistry>,
        profiles: Arc<LearningProfileService>,
        policy_service: Arc<AdaptationPolicyService>,
        attempts: Arc<dyn AttemptRepository>,
        bus: Arc<EventBus>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            registry,
            profiles,
            policy_service,
            attempts,
            bus,
            metrics,
            proposal_service: None,
            agent_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Route allowed changes through arbitration instead of applying them.
    pub fn with_proposal_service(mut self, proposals: Arc<AgentProposalService>) -> Self {
        self.proposal_service = Some(proposals);
        self
    }

    fn agent_lock(&self, agent: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.agent_locks
            .lock()
            .entry(agent.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn risk_for(&self, category: &str, key: &str) -> RiskLevel {
        self.registry
            .risk_level(category, key)
            .unwrap_or(RiskLevel::High)
    }

    /// Process one pending suggestion.
    pub async fn process_suggestion(
        &self,
        agent: &str,
        suggestion: &SuggestedPreference,
    ) -> Result<ProcessOutcome, AdaptationError> {
        let lock = self.agent_lock(agent);
        let _guard = lock.lock().await;

        let category = suggestion.category.as_str();
        let key = suggestion.key.as_str();
        let risk_level = self.risk_for(category, key);
        let policy = self.policy_service.get_or_create_policy(agent).await;
        let previous_value = self.profiles.preference_value(agent, category, key).await;

        let mut attempt = AutoAdaptationAttempt {
            id: Uuid::new_v4(),
            agent_name: agent.to_string(),
            suggestion_id: suggestion.suggestion_id,
            category: category.to_string(),
            key: key.to_string(),
            previous_value: previous_value.clone(),
            suggested_value: suggestion.suggested_value.clone(),
            confidence: suggestion.confidence,
            risk_level,
            result: AttemptResult::Skipped,
            block_reason: None,
            policy_id: policy.id,
            policy_snapshot: PolicySnapshot::of(&policy),
            timestamp: Utc::now(),
            rolled_back: false,
            rolled_back_at: None,
            rollback_reason: None,
        };

        // Already at the suggested value (explicitly or via default)?
        let effective = self.profiles.effective_value(agent, category, key).await;
        if effective.as_ref() == Some(&suggestion.suggested_value) {
            attempt.result = AttemptResult::Skipped;
            attempt.block_reason = Some(BlockReason::PreferenceAlreadyAtSuggestedValue);
            self.attempts.save(attempt.clone()).await;
            self.emit_attempt_event(event_types::PREFERENCE_AUTO_SKIPPED, &attempt).await;
            return Ok(ProcessOutcome::Skipped(attempt));
        }

        let evaluation = self
            .policy_service
            .evaluate_auto_adaptation(agent, category, key, suggestion.confidence, risk_level)
            .await;

        if !evaluation.allowed {
            attempt.result = AttemptResult::Blocked;
            attempt.block_reason = evaluation.block_reason;
            self.attempts.save(attempt.clone()).await;
            self.metrics.inc_counter(
                "adaptation_attempts_total",
                &[("agent", agent), ("result", "blocked")],
            );
            self.emit_attempt_event(event_types::PREFERENCE_AUTO_BLOCKED, &attempt).await;
            tracing::info!(
                agent = %agent,
                preference = %format!("{category}.{key}"),
                reason = attempt.block_reason.map(|r| r.as_str()).unwrap_or(""),
                "auto-adaptation blocked"
            );
            return Ok(ProcessOutcome::Blocked(attempt));
        }

        // Arbitration mode: submit as a proposal and let the arbiter decide.
        if let Some(proposals) = &self.proposal_service {
            let proposal = proposals
                .submit_proposal(ProposalInput {
                    agent_name: agent.to_string(),
                    action_type: "preference_change".to_string(),
                    target: TargetRef::preference(agent, format!("{category}.{key}")),
                    proposed_value: suggestion.suggested_value.clone(),
                    confidence_score: suggestion.confidence,
                    cost_estimate: 0.0,
                    risk_level,
                    originating_event_id: None,
                    suggestion_id: Some(suggestion.suggestion_id),
                })
                .await;
            return Ok(ProcessOutcome::Proposed {
                proposal_id: proposal.id,
            });
        }

        // Direct mode: apply, approve the suggestion, tick the limits.
        self.profiles
            .set_preference(
                agent,
                category,
                key,
                suggestion.suggested_value.clone(),
                suggestion.confidence,
                PreferenceSource::AutoAdapted,
                Some(format!("auto-adapted from suggestion {}", suggestion.suggestion_id)),
            )
            .await?;
        // Suggestions already settled elsewhere stay as they are.
        let _ = self
            .profiles
            .transition_suggestion(
                agent,
                suggestion.suggestion_id,
                SuggestionStatus::Approved,
                None,
            )
            .await;
        self.policy_service.record_auto_adapt(agent).await;

        attempt.result = AttemptResult::Applied;
        self.attempts.save(attempt.clone()).await;
        self.metrics.inc_counter(
            "adaptation_attempts_total",
            &[("agent", agent), ("result", "applied")],
        );
        self.emit_attempt_event(event_types::PREFERENCE_AUTO_APPLIED, &attempt).await;
        tracing::info!(
            agent = %agent,
            preference = %format!("{category}.{key}"),
            "auto-adaptation applied"
        );
        Ok(ProcessOutcome::Applied(attempt))
    }

    /// Apply a preference proposal that arbitration approved. This is the
    /// downstream half of arbitration mode: the winning proposal's change is
    /// written, the originating suggestion approved, and an applied attempt
    /// recorded so rollback-by-decision can find it.
    pub async fn apply_approved_proposal(
        &self,
        proposal: &concord_arbiter::AgentActionProposal,
    ) -> Result<Option<AutoAdaptationAttempt>, AdaptationError> {
        let suggestion_id = match proposal.suggestion_id {
            Some(id) => id,
            None => return Ok(None),
        };
        let dotted = match &proposal.target.key {
            Some(key) => key.clone(),
            None => return Ok(None),
        };
        let preference_key = match concord_registry::PreferenceKey::parse(&dotted) {
            Some(key) => key,
            None => return Ok(None),
        };

        let agent = proposal.agent_name.as_str();
        let lock = self.agent_lock(agent);
        let _guard = lock.lock().await;

        let category = preference_key.category.as_str();
        let key = preference_key.key.as_str();
        let policy = self.policy_service.get_or_create_policy(agent).await;
        let previous_value = self.profiles.preference_value(agent, category, key).await;

        self.profiles
            .set_preference(
                agent,
                category,
                key,
                proposal.proposed_value.clone(),
                proposal.confidence_score,
                PreferenceSource::AutoAdapted,
                Some(format!("applied by arbitration decision, suggestion {suggestion_id}")),
            )
            .await?;
        let _ = self
            .profiles
            .transition_suggestion(agent, suggestion_id, SuggestionStatus::Approved, None)
            .await;
        self.policy_service.record_auto_adapt(agent).await;

        let attempt = AutoAdaptationAttempt {
            id: Uuid::new_v4(),
            agent_name: agent.to_string(),
            suggestion_id,
            category: category.to_string(),
            key: key.to_string(),
            previous_value,
            suggested_value: proposal.proposed_value.clone(),
            confidence: proposal.confidence_score,
            risk_level: proposal.risk_level,
            result: AttemptResult::Applied,
            block_reason: None,
            policy_id: policy.id,
            policy_snapshot: PolicySnapshot::of(&policy),
            timestamp: Utc::now(),
            rolled_back: false,
            rolled_back_at: None,
            rollback_reason: None,
        };
        self.attempts.save(attempt.clone()).await;
        self.metrics.inc_counter(
            "adaptation_attempts_total",
            &[("agent", agent), ("result", "applied")],
        );
        self.emit_attempt_event(event_types::PREFERENCE_AUTO_APPLIED, &attempt).await;
        Ok(Some(attempt))
    }

    /// Roll an applied attempt back. Idempotent: an already-rolled-back
    /// attempt is returned unchanged.
    pub async fn rollback(
        &self,
        attempt_id: Uuid,
        reason: &str,
    ) -> Result<AutoAdaptationAttempt, AdaptationError> {
        let attempt = self
            .attempts
            .get(attempt_id)
            .await
            .ok_or(AdaptationError::AttemptNotFound(attempt_id))?;

        if attempt.rolled_back {
            return Ok(attempt);
        }
        if attempt.result != AttemptResult::Applied {
            return Err(AdaptationError::NotRollbackable(attempt_id));
        }

        match &attempt.previous_value {
            Some(previous) => {
                self.profiles
                    .set_preference(
                        &attempt.agent_name,
                        &attempt.category,
                        &attempt.key,
                        previous.clone(),
                        1.0,
                        PreferenceSource::Rollback,
                        Some(reason.to_string()),
                    )
                    .await?;
            }
            None => {
                self.profiles
                    .reset_to_default(
                        &attempt.agent_name,
                        &attempt.category,
                        &attempt.key,
                        Some(reason.to_string()),
                    )
                    .await?;
            }
        }

        let updated = self.attempts.mark_rolled_back(attempt_id, reason).await?;
        self.metrics.inc_counter(
            "adaptation_rollbacks_total",
            &[("agent", &updated.agent_name)],
        );
        self.bus
            .dispatch(DomainEvent::new(
                event_types::PREFERENCE_ROLLED_BACK,
                "attempt",
                updated.id.to_string(),
                json!({
                    "agent": updated.agent_name,
                    "category": updated.category,
                    "key": updated.key,
                    "reason": reason,
                }),
            ))
            .await;
        tracing::info!(
            agent = %updated.agent_name,
            attempt_id = %attempt_id,
            "auto-adaptation rolled back"
        );
        Ok(updated)
    }

    async fn emit_attempt_event(&self, event_type: &str, attempt: &AutoAdaptationAttempt) {
        self.bus
            .dispatch(DomainEvent::new(
                event_type,
                "attempt",
                attempt.id.to_string(),
                json!({
                    "agent": attempt.agent_name,
                    "suggestion_id": attempt.suggestion_id,
                    "category": attempt.category,
                    "key": attempt.key,
                    "result": attempt.result,
                    "reason": attempt.block_reason.map(|r| r.as_str()),
                }),
            ))
            .await;
    }
}
