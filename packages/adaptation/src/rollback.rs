//! Rollback by preference key or by arbitration decision.

use std::sync::Arc;
use uuid::Uuid;

use concord_arbiter::{ArbitrationDecisionRepository, ProposalRepository};
use concord_learning::{LearningProfileService, PreferenceChange};
use concord_registry::PreferenceKey;

use crate::attempt::{AttemptRepository, AutoAdaptationAttempt};
use crate::engine::AutoAdaptationEngine;
use crate::error::AdaptationError;

/// How a rollback request was satisfied.
#[derive(Debug, Clone)]
pub enum RollbackOutcome {
    /// An applied attempt was unwound
    AttemptRolledBack(AutoAdaptationAttempt),
    /// No applied attempt existed; the preference was reset to its default
    ResetToDefault(PreferenceChange),
    /// Nothing to do (already rolled back / no linked changes)
    NothingToRollBack,
}

/// Admin-facing rollback entry points. All idempotent and audited through
/// the change history.
pub struct RollbackService {
    engine: Arc<AutoAdaptationEngine>,
    attempts: Arc<dyn AttemptRepository>,
    profiles: Arc<LearningProfileService>,
    decisions: Arc<dyn ArbitrationDecisionRepository>,
    proposals: Arc<dyn ProposalRepository>,
}

impl RollbackService {
    pub fn new(
        engine: Arc<AutoAdaptationEngine>,
        attempts: Arc<dyn AttemptRepository>,
        profiles: Arc<LearningProfileService>,
        decisions: Arc<dyn ArbitrationDecisionRepository>,
        proposals: Arc<dyn ProposalRepository>,
    ) -> Self {
        Self {
            engine,
            attempts,
            profiles,
            decisions,
            proposals,
        }
    }

    /// Restore the last applied attempt for `"category.key"`, or reset the
    /// preference to its registry default when none exists.
    pub async fn rollback_by_preference(
        &self,
        agent: &str,
        dotted_key: &str,
        reason: &str,
    ) -> Result<RollbackOutcome, AdaptationError> {
        let preference_key = PreferenceKey::parse(dotted_key)
            .ok_or_else(|| AdaptationError::InvalidPreferenceKey(dotted_key.to_string()))?;

        if let Some(attempt) = self
            .attempts
            .find_last_applied(agent, &preference_key.category, &preference_key.key)
            .await
        {
            let rolled = self.engine.rollback(attempt.id, reason).await?;
            return Ok(RollbackOutcome::AttemptRolledBack(rolled));
        }

        let change = self
            .profiles
            .reset_to_default(
                agent,
                &preference_key.category,
                &preference_key.key,
                Some(reason.to_string()),
            )
            .await?;
        Ok(RollbackOutcome::ResetToDefault(change))
    }

    /// Unwind every preference mutation linked to an arbitration decision:
    /// decision → approved proposal → suggestion → applied attempts.
    pub async fn rollback_by_decision(
        &self,
        decision_id: Uuid,
        reason: &str,
    ) -> Result<Vec<AutoAdaptationAttempt>, AdaptationError> {
        let decision = self
            .decisions
            .get(decision_id)
            .await
            .ok_or(AdaptationError::DecisionNotFound(decision_id))?;

        let mut rolled = Vec::new();
        let linked = self.proposals.list_by_decision(decision.id).await;
        for proposal in linked {
            let suggestion_id = match proposal.suggestion_id {
                Some(id) => id,
                None => continue,
            };
            for attempt in self.attempts.list_by_suggestion(suggestion_id).await {
                if attempt.result == crate::attempt::AttemptResult::Applied && !attempt.rolled_back
                {
                    rolled.push(self.engine.rollback(attempt.id, reason).await?);
                }
            }
        }

        tracing::info!(
            decision_id = %decision_id,
            rolled_back = rolled.len(),
            "decision rollback completed"
        );
        Ok(rolled)
    }
}
