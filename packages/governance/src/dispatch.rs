//! Governed dispatch of domain events to advisory agents.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use concord_events::DomainEvent;
use concord_observability::MetricsRegistry;
use concord_registry::RiskLevel;

use crate::governor::AgentGovernor;

/// An action an agent wants to take, before it becomes a proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDraft {
    /// What kind of action (e.g. "preference_change", "reschedule")
    pub action_type: String,
    /// Target resource kind (e.g. "preference", "task")
    pub target_kind: String,
    /// Target resource id
    pub target_id: String,
    /// Sub-key within the target, when it has one
    pub target_key: Option<String>,
    /// Proposed value
    pub proposed_value: Value,
    /// Agent confidence in [0, 1]
    pub confidence: f64,
    /// Estimated cost of executing the action (USD)
    pub cost_estimate: f64,
    /// Risk of the action
    pub risk_level: RiskLevel,
    /// Suggestion this draft came from, when adaptation originated it
    pub suggestion_id: Option<uuid::Uuid>,
}

/// An advisory agent. The set of kinds is closed for governance policy
/// keys; new kinds require policy registration.
#[async_trait]
pub trait AdvisoryAgent: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: &DomainEvent) -> Vec<ActionDraft>;
}

/// Where accepted drafts go (the proposal pipeline).
#[async_trait]
pub trait ProposalSink: Send + Sync {
    async fn submit(&self, agent: &str, originating_event: &DomainEvent, draft: ActionDraft);
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchSummary {
    pub agents_invoked: usize,
    pub agents_skipped_cooldown: usize,
    pub drafts_submitted: usize,
    pub drafts_dropped_limit: usize,
    pub drafts_dropped_confidence: usize,
}

/// Routes domain events to registered agents under governor limits.
pub struct AgentDispatcher {
    governor: Arc<AgentGovernor>,
    agents: RwLock<Vec<Arc<dyn AdvisoryAgent>>>,
    sink: Arc<dyn ProposalSink>,
    metrics: Arc<MetricsRegistry>,
}

impl AgentDispatcher {
    pub fn new(
        governor: Arc<AgentGovernor>,
        sink: Arc<dyn ProposalSink>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            governor,
            agents: RwLock::new(Vec::new()),
            sink,
            metrics,
        }
    }

    pub fn register_agent(&self, agent: Arc<dyn AdvisoryAgent>) {
        self.agents.write().push(agent);
    }

    /// Offer the event to every registered agent, respecting cooldowns,
    /// per-event suggestion budgets and confidence thresholds.
    pub async fn dispatch_event(&self, event: &DomainEvent) -> DispatchSummary {
        let agents: Vec<Arc<dyn AdvisoryAgent>> = self.agents.read().clone();
        let mut summary = DispatchSummary::default();
        let event_id = event.id.to_string();

        for agent in agents {
            let name = agent.name().to_string();

            if !self.governor.try_begin_action(&name, &event.aggregate_id) {
                summary.agents_skipped_cooldown += 1;
                self.metrics
                    .inc_counter("agent_dispatch_skipped_total", &[("agent", &name), ("reason", "cooldown")]);
                continue;
            }

            summary.agents_invoked += 1;
            let policy = self.governor.policy_for(&name);
            let drafts = agent.handle(event).await;

            for draft in drafts {
                if !self.governor.try_count_suggestion(&name, &event_id) {
                    summary.drafts_dropped_limit += 1;
                    self.metrics.inc_counter(
                        "agent_drafts_dropped_total",
                        &[("agent", &name), ("reason", "per_event_limit")],
                    );
                    continue;
                }
                if draft.confidence < policy.confidence_threshold {
                    summary.drafts_dropped_confidence += 1;
                    self.metrics.inc_counter(
                        "agent_drafts_dropped_total",
                        &[("agent", &name), ("reason", "confidence")],
                    );
                    continue;
                }
                self.sink.submit(&name, event, draft).await;
                summary.drafts_submitted += 1;
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::AgentPolicy;
    use parking_lot::Mutex;
    use serde_json::json;

    struct StubAgent {
        name: String,
        drafts: Vec<ActionDraft>,
    }

    #[async_trait]
    impl AdvisoryAgent for StubAgent {
        fn name(&self) -> &str {
            &self.name
        }

        async fn handle(&self, _event: &DomainEvent) -> Vec<ActionDraft> {
            self.drafts.clone()
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        submitted: Mutex<Vec<(String, ActionDraft)>>,
    }

    #[async_trait]
    impl ProposalSink for CollectingSink {
        async fn submit(&self, agent: &str, _event: &DomainEvent, draft: ActionDraft) {
            self.submitted.lock().push((agent.to_string(), draft));
        }
    }

    fn draft(confidence: f64) -> ActionDraft {
        ActionDraft {
            action_type: "preference_change".to_string(),
            target_kind: "preference".to_string(),
            target_id: "user-1".to_string(),
            target_key: Some("communication.tone".to_string()),
            proposed_value: json!("neutral"),
            confidence,
            cost_estimate: 0.0,
            risk_level: RiskLevel::Low,
            suggestion_id: None,
        }
    }

    fn event() -> DomainEvent {
        DomainEvent::new("habit.completed", "user", "user-1", json!({}))
    }

    #[tokio::test]
    async fn test_dispatch_submits_confident_drafts() {
        let governor = Arc::new(AgentGovernor::new());
        governor.register_policy(AgentPolicy::for_agent("Coach").with_cooldown_ms(0));
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = AgentDispatcher::new(
            governor,
            sink.clone(),
            Arc::new(MetricsRegistry::new()),
        );
        dispatcher.register_agent(Arc::new(StubAgent {
            name: "Coach".to_string(),
            drafts: vec![draft(0.9)],
        }));

        let summary = dispatcher.dispatch_event(&event()).await;
        assert_eq!(summary.drafts_submitted, 1);
        assert_eq!(sink.submitted.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_drops_low_confidence() {
        let governor = Arc::new(AgentGovernor::new());
        governor.register_policy(
            AgentPolicy::for_agent("Coach")
                .with_cooldown_ms(0)
                .with_confidence_threshold(0.8),
        );
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = AgentDispatcher::new(
            governor,
            sink.clone(),
            Arc::new(MetricsRegistry::new()),
        );
        dispatcher.register_agent(Arc::new(StubAgent {
            name: "Coach".to_string(),
            drafts: vec![draft(0.5)],
        }));

        let summary = dispatcher.dispatch_event(&event()).await;
        assert_eq!(summary.drafts_submitted, 0);
        assert_eq!(summary.drafts_dropped_confidence, 1);
    }

    #[tokio::test]
    async fn test_dispatch_respects_cooldown() {
        let governor = Arc::new(AgentGovernor::new());
        governor.register_policy(AgentPolicy::for_agent("Coach").with_cooldown_ms(60_000));
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = AgentDispatcher::new(
            governor,
            sink.clone(),
            Arc::new(MetricsRegistry::new()),
        );
        dispatcher.register_agent(Arc::new(StubAgent {
            name: "Coach".to_string(),
            drafts: vec![draft(0.9)],
        }));

        let first = dispatcher.dispatch_event(&event()).await;
        assert_eq!(first.agents_invoked, 1);

        let second = dispatcher.dispatch_event(&event()).await;
        assert_eq!(second.agents_invoked, 0);
        assert_eq!(second.agents_skipped_cooldown, 1);
    }

    #[tokio::test]
    async fn test_dispatch_enforces_per_event_budget() {
        let governor = Arc::new(AgentGovernor::new());
        governor.register_policy(
            AgentPolicy::for_agent("Coach")
                .with_cooldown_ms(0)
                .with_max_suggestions_per_event(1),
        );
        let sink = Arc::new(CollectingSink::default());
        let dispatcher = AgentDispatcher::new(
            governor,
            sink.clone(),
            Arc::new(MetricsRegistry::new()),
        );
        dispatcher.register_agent(Arc::new(StubAgent {
            name: "Coach".to_string(),
            drafts: vec![draft(0.9), draft(0.95)],
        }));

        let summary = dispatcher.dispatch_event(&event()).await;
        assert_eq!(summary.drafts_submitted, 1);
        assert_eq!(summary.drafts_dropped_limit, 1);
    }
}
