//! Adaptation policy management and the ordered evaluation gate.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use concord_arbiter::{PreferenceLockProbe, TargetRef};
use concord_registry::{PreferenceKey, PreferenceRegistry, RiskLevel};

use crate::attempt::BlockReason;
use crate::policy::{AdaptationMode, AdaptationPolicy, RateLimit, ScopeRestriction};

/// Storage port for adaptation policies.
#[async_trait]
pub trait AdaptationPolicyRepository: Send + Sync {
    async fn get(&self, agent: &str) -> Option<AdaptationPolicy>;

    async fn save(&self, policy: AdaptationPolicy);

    async fn list(&self) -> Vec<AdaptationPolicy>;
}

/// In-memory policy store.
#[derive(Default)]
pub struct InMemoryAdaptationPolicyRepository {
    policies: RwLock<HashMap<String, AdaptationPolicy>>,
}

impl InMemoryAdaptationPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AdaptationPolicyRepository for InMemoryAdaptationPolicyRepository {
    async fn get(&self, agent: &str) -> Option<AdaptationPolicy> {
        self.policies.read().await.get(agent).cloned()
    }

    async fn save(&self, policy: AdaptationPolicy) {
        self.policies
            .write()
            .await
            .insert(policy.agent_name.clone(), policy);
    }

    async fn list(&self) -> Vec<AdaptationPolicy> {
        self.policies.read().await.values().cloned().collect()
    }
}

/// Options when opting an agent into auto-adaptation.
#[derive(Debug, Clone, Default)]
pub struct EnableOptions {
    pub min_confidence: Option<f64>,
    pub allowed_risk_levels: Option<Vec<RiskLevel>>,
    pub cooldown_ms: Option<u64>,
    pub rate_limit: Option<RateLimit>,
}

/// Result of one evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub allowed: bool,
    pub block_reason: Option<BlockReason>,
    /// The confidence floor that applied (policy, scope and registry folded)
    pub effective_confidence_threshold: f64,
}

impl EvaluationOutcome {
    fn blocked(reason: BlockReason, threshold: f64) -> Self {
        Self {
            allowed: false,
            block_reason: Some(reason),
            effective_confidence_threshold: threshold,
        }
    }
}

/// Manages adaptation policies and answers "may this change auto-apply?".
pub struct AdaptationPolicyService {
    registry: Arc<PreferenceRegistry>,
    policies: Arc<dyn AdaptationPolicyRepository>,
}

impl AdaptationPolicyService {
    pub fn new(
        registry: Arc<PreferenceRegistry>,
        policies: Arc<dyn AdaptationPolicyRepository>,
    ) -> Self {
        Self { registry, policies }
    }

    pub async fn get_or_create_policy(&self, agent: &str) -> AdaptationPolicy {
        if let Some(policy) = self.policies.get(agent).await {
            return policy;
        }
        let policy = AdaptationPolicy::default_for(agent);
        self.policies.save(policy.clone()).await;
        policy
    }

    pub async fn enable_auto_adaptation(&self, agent: &str, opts: EnableOptions) -> AdaptationPolicy {
        let mut policy = self.get_or_create_policy(agent).await;
        policy.mode = AdaptationMode::Auto;
        policy.user_opted_in = true;
        if let Some(min_confidence) = opts.min_confidence {
            policy.min_confidence = min_confidence;
        }
        if let Some(levels) = opts.allowed_risk_levels {
            policy.allowed_risk_levels = levels;
        }
        if let Some(cooldown_ms) = opts.cooldown_ms {
            policy.cooldown_ms = cooldown_ms;
        }
        if let Some(rate_limit) = opts.rate_limit {
            policy.rate_limit = rate_limit;
        }
        self.policies.save(policy.clone()).await;
        tracing::info!(agent = %agent, "auto-adaptation enabled");
        policy
    }

    pub async fn disable_auto_adaptation(&self, agent: &str) -> AdaptationPolicy {
        let mut policy = self.get_or_create_policy(agent).await;
        policy.mode = AdaptationMode::Manual;
        policy.user_opted_in = false;
        self.policies.save(policy.clone()).await;
        tracing::info!(agent = %agent, "auto-adaptation disabled");
        policy
    }

    pub async fn lock_preference(&self, agent: &str, category: &str, key: &str) {
        let mut policy = self.get_or_create_policy(agent).await;
        let mut restriction = policy
            .scope_for(category, key)
            .cloned()
            .unwrap_or(ScopeRestriction {
                category: category.to_string(),
                key: key.to_string(),
                mode: None,
                locked: false,
                min_confidence: None,
            });
        restriction.locked = true;
        policy.upsert_scope(restriction);
        self.policies.save(policy).await;
    }

    pub async fn unlock_preference(&self, agent: &str, category: &str, key: &str) {
        let mut policy = self.get_or_create_policy(agent).await;
        if let Some(mut restriction) = policy.scope_for(category, key).cloned() {
            restriction.locked = false;
            policy.upsert_scope(restriction);
            self.policies.save(policy).await;
        }
    }

    pub async fn set_scope_restriction(&self, agent: &str, restriction: ScopeRestriction) {
        let mut policy = self.get_or_create_policy(agent).await;
        policy.upsert_scope(restriction);
        self.policies.save(policy).await;
    }

    /// The ordered gate. Checks run in a fixed order and short-circuit at
    /// the first failure; an expired rate window is reset as a side effect.
    pub async fn evaluate_auto_adaptation(
        &self,
        agent: &str,
        category: &str,
        key: &str,
        confidence: f64,
        risk_level: RiskLevel,
    ) -> EvaluationOutcome {
        let mut policy = self.get_or_create_policy(agent).await;

        let threshold = policy
            .effective_min_confidence(category, key)
            .max(self.registry.confidence_threshold(category, key).unwrap_or(0.0));

        // 1. Registry adaptivity.
        if !self.registry.is_adaptive(category, key) {
            return EvaluationOutcome::blocked(BlockReason::PreferenceNotAdaptive, threshold);
        }

        // 2. Opt-in, then global mode.
        if !policy.user_opted_in {
            return EvaluationOutcome::blocked(BlockReason::UserNotOptedIn, threshold);
        }
        if policy.mode == AdaptationMode::Manual {
            return EvaluationOutcome::blocked(BlockReason::ModeIsManual, threshold);
        }

        // 3. Per-preference lock.
        if policy.is_locked(category, key) {
            return EvaluationOutcome::blocked(BlockReason::PreferenceLocked, threshold);
        }

        // 4. Per-preference mode override.
        if policy.effective_mode(category, key) == AdaptationMode::Manual {
            return EvaluationOutcome::blocked(BlockReason::ModeIsManual, threshold);
        }

        // 5. Risk allow-list.
        if !policy.allowed_risk_levels.contains(&risk_level) {
            return EvaluationOutcome::blocked(BlockReason::RiskLevelNotAllowed, threshold);
        }

        // 6. Cooldown.
        let now = Utc::now();
        if let Some(last) = policy.last_auto_adapt_at {
            let elapsed_ms = (now - last).num_milliseconds();
            if elapsed_ms < policy.cooldown_ms as i64 {
                return EvaluationOutcome::blocked(BlockReason::CooldownNotElapsed, threshold);
            }
        }

        // 7. Rate window: reset when elapsed, otherwise enforce the cap.
        match policy.window_started_at {
            Some(started)
                if (now - started).num_milliseconds() >= policy.rate_limit.window_ms as i64 =>
            {
                policy.window_started_at = Some(now);
                policy.current_window_count = 0;
                self.policies.save(policy.clone()).await;
            }
            Some(_) => {
                if policy.current_window_count >= policy.rate_limit.max_changes {
                    return EvaluationOutcome::blocked(BlockReason::RateLimitExceeded, threshold);
                }
            }
            None => {}
        }

        // 8. Confidence floor.
        if confidence < threshold {
            return EvaluationOutcome::blocked(BlockReason::ConfidenceTooLow, threshold);
        }

        EvaluationOutcome {
            allowed: true,
            block_reason: None,
            effective_confidence_threshold: threshold,
        }
    }

    /// Stamp the cooldown and count one change against the rate window.
    pub async fn record_auto_adapt(&self, agent: &str) {
        let mut policy = self.get_or_create_policy(agent).await;
        let now = Utc::now();
        policy.last_auto_adapt_at = Some(now);
        match policy.window_started_at {
            Some(started)
                if (now - started).num_milliseconds() < policy.rate_limit.window_ms as i64 =>
            {
                policy.current_window_count += 1;
            }
            _ => {
                policy.window_started_at = Some(now);
                policy.current_window_count = 1;
            }
        }
        self.policies.save(policy).await;
    }
}

#[async_trait]
impl PreferenceLockProbe for AdaptationPolicyService {
    async fn is_locked(&self, agent_name: &str, target: &TargetRef) -> bool {
        if target.kind != "preference" {
            return false;
        }
        let dotted = match &target.key {
            Some(key) => key,
            None => return false,
        };
        let preference_key = match PreferenceKey::parse(dotted) {
            Some(key) => key,
            None => return false,
        };
        self.policies
            .get(agent_name)
            .await
            .map(|p| p.is_locked(&preference_key.category, &preference_key.key))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AdaptationPolicyService {
        AdaptationPolicyService::new(
            Arc::new(PreferenceRegistry::standard()),
            Arc::new(InMemoryAdaptationPolicyRepository::new()),
        )
    }

    #[tokio::test]
    async fn test_opt_out_blocks_first() {
        let svc = service();
        let outcome = svc
            .evaluate_auto_adaptation("Coach", "communication", "tone", 0.99, RiskLevel::Low)
            .await;
        assert!(!outcome.allowed);
        assert_eq!(outcome.block_reason, Some(BlockReason::UserNotOptedIn));
    }

    #[tokio::test]
    async fn test_non_adaptive_preference_blocks_before_opt_in() {
        let svc = service();
        // retention_days is declared non-adaptive in the standard catalogue.
        let outcome = svc
            .evaluate_auto_adaptation("Coach", "logging", "retention_days", 0.99, RiskLevel::Low)
            .await;
        assert_eq!(outcome.block_reason, Some(BlockReason::PreferenceNotAdaptive));
    }

    #[tokio::test]
    async fn test_lock_blocks_before_risk() {
        let svc = service();
        svc.enable_auto_adaptation("Coach", EnableOptions::default()).await;
        svc.lock_preference("Coach", "communication", "tone").await;

        let outcome = svc
            .evaluate_auto_adaptation("Coach", "communication", "tone", 0.99, RiskLevel::High)
            .await;
        assert_eq!(outcome.block_reason, Some(BlockReason::PreferenceLocked));

        svc.unlock_preference("Coach", "communication", "tone").await;
        let outcome = svc
            .evaluate_auto_adaptation("Coach", "communication", "tone", 0.99, RiskLevel::High)
            .await;
        assert_eq!(outcome.block_reason, Some(BlockReason::RiskLevelNotAllowed));
    }

    #[tokio::test]
    async fn test_scope_mode_override_blocks() {
        let svc = service();
        svc.enable_auto_adaptation("Coach", EnableOptions::default()).await;
        svc.set_scope_restriction(
            "Coach",
            ScopeRestriction {
                category: "communication".to_string(),
                key: "tone".to_string(),
                mode: Some(AdaptationMode::Manual),
                locked: false,
                min_confidence: None,
            },
        )
        .await;

        let outcome = svc
            .evaluate_auto_adaptation("Coach", "communication", "tone", 0.99, RiskLevel::Low)
            .await;
        assert_eq!(outcome.block_reason, Some(BlockReason::ModeIsManual));
    }

    #[tokio::test]
    async fn test_cooldown_blocks_after_recorded_adapt() {
        let svc = service();
        svc.enable_auto_adaptation(
            "Coach",
            EnableOptions {
                cooldown_ms: Some(60_000),
                ..Default::default()
            },
        )
        .await;

        let first = svc
            .evaluate_auto_adaptation("Coach", "communication", "tone", 0.9, RiskLevel::Low)
            .await;
        assert!(first.allowed);
        svc.record_auto_adapt("Coach").await;

        let second = svc
            .evaluate_auto_adaptation("Coach", "communication", "tone", 0.9, RiskLevel::Low)
            .await;
        assert_eq!(second.block_reason, Some(BlockReason::CooldownNotElapsed));
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_third_change() {
        let svc = service();
        svc.enable_auto_adaptation(
            "Coach",
            EnableOptions {
                cooldown_ms: Some(0),
                rate_limit: Some(RateLimit {
                    max_changes: 2,
                    window_ms: 3_600_000,
                }),
                ..Default::default()
            },
        )
        .await;

        for _ in 0..2 {
            let outcome = svc
                .evaluate_auto_adaptation("Coach", "communication", "tone", 0.9, RiskLevel::Low)
                .await;
            assert!(outcome.allowed);
            svc.record_auto_adapt("Coach").await;
        }

        let third = svc
            .evaluate_auto_adaptation("Coach", "communication", "tone", 0.9, RiskLevel::Low)
            .await;
        assert_eq!(third.block_reason, Some(BlockReason::RateLimitExceeded));
    }

    #[tokio::test]
    async fn test_confidence_threshold_folds_registry_floor() {
        let svc = service();
        svc.enable_auto_adaptation(
            "Coach",
            EnableOptions {
                min_confidence: Some(0.5),
                allowed_risk_levels: Some(vec![RiskLevel::Low, RiskLevel::Medium, RiskLevel::High]),
                cooldown_ms: Some(0),
                ..Default::default()
            },
        )
        .await;

        // auto_reschedule declares a 0.85 registry floor, above the policy's 0.5.
        let outcome = svc
            .evaluate_auto_adaptation("Coach", "scheduling", "auto_reschedule", 0.7, RiskLevel::High)
            .await;
        assert_eq!(outcome.block_reason, Some(BlockReason::ConfidenceTooLow));
        assert_eq!(outcome.effective_confidence_threshold, 0.85);
    }

    #[tokio::test]
    async fn test_lock_probe_answers_for_preference_targets() {
        let svc = service();
        svc.lock_preference("Coach", "communication", "tone").await;

        let locked = svc
            .is_locked("Coach", &TargetRef::preference("user-1", "communication.tone"))
            .await;
        assert!(locked);

        let other_agent = svc
            .is_locked("Planner", &TargetRef::preference("user-1", "communication.tone"))
            .await;
        assert!(!other_agent);

        let non_preference = svc.is_locked("Coach", &TargetRef::new("task", "t-1")).await;
        assert!(!non_preference);
    }
}
