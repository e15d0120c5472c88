//! Pure read-models for the admin plane.
//!
//! Projections only read; running one twice produces equal output and
//! performs zero writes or event dispatches.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use concord_adaptation::{AttemptRepository, AttemptResult};
use concord_arbiter::{ArbitrationDecisionRepository, ArbitrationOutcome};
use concord_governance::DecisionRecordRepository;
use concord_learning::{LearningProfileRepository, SuggestionStatus};
use concord_registry::PreferenceRegistry;

/// One preference next to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceView {
    pub category: String,
    pub key: String,
    pub value: Value,
    pub default_value: Value,
    pub differs_from_default: bool,
    pub confidence: f64,
    pub source: String,
    pub last_updated: DateTime<Utc>,
}

/// All learned preferences of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPreferencesView {
    pub agent_name: String,
    pub preferences: Vec<PreferenceView>,
}

/// One suggestion for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionView {
    pub suggestion_id: Uuid,
    pub agent_name: String,
    pub category: String,
    pub key: String,
    pub current_value: Option<Value>,
    pub suggested_value: Value,
    pub confidence: f64,
    pub reason: String,
    pub status: SuggestionStatus,
    pub suggested_at: DateTime<Utc>,
}

/// One arbitration decision for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationView {
    pub id: Uuid,
    pub conflict_id: Option<Uuid>,
    pub outcome: ArbitrationOutcome,
    pub strategy: String,
    pub winning_proposal_id: Option<Uuid>,
    pub suppressed_count: usize,
    pub vetoed_count: usize,
    pub requires_human_approval: bool,
    pub executed: bool,
    pub reasoning_summary: String,
    pub created_at: DateTime<Utc>,
}

/// One adaptation attempt for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptView {
    pub id: Uuid,
    pub agent_name: String,
    pub category: String,
    pub key: String,
    pub result: AttemptResult,
    pub block_reason: Option<String>,
    pub rolled_back: bool,
    pub timestamp: DateTime<Utc>,
}

/// One entry on the merged audit timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub entry_type: String,
    pub agent_name: Option<String>,
    pub summary: String,
    pub reference_id: Uuid,
}

/// Read-model assembly over the plane's repositories.
pub struct ProjectionService {
    registry: Arc<PreferenceRegistry>,
    profiles: Arc<dyn LearningProfileRepository>,
    attempts: Arc<dyn AttemptRepository>,
    arbitrations: Arc<dyn ArbitrationDecisionRepository>,
    decisions: Arc<dyn DecisionRecordRepository>,
}

impl ProjectionService {
    pub fn new(
        registry: Arc<PreferenceRegistry>,
        profiles: Arc<dyn LearningProfileRepository>,
        attempts: Arc<dyn AttemptRepository>,
        arbitrations: Arc<dyn ArbitrationDecisionRepository>,
        decisions: Arc<dyn DecisionRecordRepository>,
    ) -> Self {
        Self {
            registry,
            profiles,
            attempts,
            arbitrations,
            decisions,
        }
    }

    /// Learned preferences per agent, optionally filtered to one agent.
    pub async fn preferences_view(&self, agent: Option<&str>) -> Vec<AgentPreferencesView> {
        let mut views = Vec::new();
        for profile in self.profiles.list().await {
            if let Some(filter) = agent {
                if profile.agent_name != filter {
                    continue;
                }
            }
            let preferences = profile
                .preferences
                .iter()
                .map(|preference| {
                    let default_value = self
                        .registry
                        .default_value_for_agent(
                            &profile.agent_name,
                            &preference.category,
                            &preference.key,
                        )
                        .unwrap_or(Value::Null);
                    PreferenceView {
                        category: preference.category.clone(),
                        key: preference.key.clone(),
                        value: preference.value.clone(),
                        differs_from_default: preference.value != default_value,
                        default_value,
                        confidence: preference.confidence,
                        source: format!("{:?}", preference.source).to_lowercase(),
                        last_updated: preference.last_updated,
                    }
                })
                .collect();
            views.push(AgentPreferencesView {
                agent_name: profile.agent_name,
                preferences,
            });
        }
        views
    }

    /// Suggestions across agents, filterable by status and agent.
    pub async fn suggestions_view(
        &self,
        status: Option<SuggestionStatus>,
        agent: Option<&str>,
    ) -> Vec<SuggestionView> {
        let mut views = Vec::new();
        for profile in self.profiles.list().await {
            if let Some(filter) = agent {
                if profile.agent_name != filter {
                    continue;
                }
            }
            for suggestion in &profile.suggestions {
                if let Some(wanted) = status {
                    if suggestion.status != wanted {
                        continue;
                    }
                }
                views.push(SuggestionView {
                    suggestion_id: suggestion.suggestion_id,
                    agent_name: profile.agent_name.clone(),
                    category: suggestion.category.clone(),
                    key: suggestion.key.clone(),
                    current_value: suggestion.current_value.clone(),
                    suggested_value: suggestion.suggested_value.clone(),
                    confidence: suggestion.confidence,
                    reason: suggestion.reason.clone(),
                    status: suggestion.status,
                    suggested_at: suggestion.suggested_at,
                });
            }
        }
        views.sort_by(|a, b| a.suggested_at.cmp(&b.suggested_at));
        views
    }

    /// Arbitration decisions, optionally escalations only.
    pub async fn arbitrations_view(&self, escalated_only: bool) -> Vec<ArbitrationView> {
        self.arbitrations
            .list_all()
            .await
            .into_iter()
            .filter(|d| !escalated_only || d.outcome == ArbitrationOutcome::Escalated)
            .map(|d| ArbitrationView {
                id: d.id,
                conflict_id: d.conflict_id,
                outcome: d.outcome,
                strategy: format!("{:?}", d.strategy_used).to_lowercase(),
                winning_proposal_id: d.winning_proposal_id,
                suppressed_count: d.suppressed_proposal_ids.len(),
                vetoed_count: d.vetoed_proposal_ids.len(),
                requires_human_approval: d.requires_human_approval,
                executed: d.executed,
                reasoning_summary: d.reasoning_summary,
                created_at: d.created_at,
            })
            .collect()
    }

    /// Escalations still waiting for a human.
    pub async fn pending_escalations_view(&self) -> Vec<ArbitrationView> {
        self.arbitrations
            .list_open_escalations()
            .await
            .into_iter()
            .map(|d| ArbitrationView {
                id: d.id,
                conflict_id: d.conflict_id,
                outcome: d.outcome,
                strategy: format!("{:?}", d.strategy_used).to_lowercase(),
                winning_proposal_id: d.winning_proposal_id,
                suppressed_count: d.suppressed_proposal_ids.len(),
                vetoed_count: d.vetoed_proposal_ids.len(),
                requires_human_approval: d.requires_human_approval,
                executed: d.executed,
                reasoning_summary: d.reasoning_summary,
                created_at: d.created_at,
            })
            .collect()
    }

    /// Attempts, optionally filtered by agent.
    pub async fn attempts_view(&self, agent: Option<&str>) -> Vec<AttemptView> {
        let attempts = match agent {
            Some(agent) => self.attempts.list_by_agent(agent).await,
            None => self.attempts.list_all().await,
        };
        attempts
            .into_iter()
            .map(|a| AttemptView {
                id: a.id,
                agent_name: a.agent_name,
                category: a.category,
                key: a.key,
                result: a.result,
                block_reason: a.block_reason.map(|r| r.as_str().to_string()),
                rolled_back: a.rolled_back,
                timestamp: a.timestamp,
            })
            .collect()
    }

    /// Merged audit timeline over attempts, preference changes, decision
    /// records and arbitration decisions, newest first.
    pub async fn audit_timeline(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
        entry_type: Option<&str>,
        agent: Option<&str>,
    ) -> Vec<AuditEntry> {
        let mut entries = Vec::new();

        for attempt in self.attempts.list_between(since, until).await {
            entries.push(AuditEntry {
                at: attempt.timestamp,
                entry_type: "adaptation_attempt".to_string(),
                agent_name: Some(attempt.agent_name.clone()),
                summary: format!(
                    "{:?} {}.{}{}",
                    attempt.result,
                    attempt.category,
                    attempt.key,
                    attempt
                        .block_reason
                        .map(|r| format!(" ({})", r.as_str()))
                        .unwrap_or_default()
                ),
                reference_id: attempt.id,
            });
        }

        for profile in self.profiles.list().await {
            for change in &profile.change_history {
                if change.changed_at < since || change.changed_at > until {
                    continue;
                }
                entries.push(AuditEntry {
                    at: change.changed_at,
                    entry_type: "preference_change".to_string(),
                    agent_name: Some(profile.agent_name.clone()),
                    summary: format!(
                        "{}.{} -> {} ({:?})",
                        change.category, change.key, change.new_value, change.source
                    ),
                    reference_id: change.id,
                });
            }
        }

        for decision in self.arbitrations.list_between(since, until).await {
            entries.push(AuditEntry {
                at: decision.created_at,
                entry_type: "arbitration".to_string(),
                agent_name: None,
                summary: decision.reasoning_summary.clone(),
                reference_id: decision.id,
            });
        }

        for record in self.decisions.list_between(since, until).await {
            entries.push(AuditEntry {
                at: record.created_at,
                entry_type: "agent_decision".to_string(),
                agent_name: Some(record.agent_name.clone()),
                summary: format!("{}: {}", record.decision_type, record.decision_content),
                reference_id: record.id,
            });
        }

        entries.retain(|entry| {
            entry_type.map(|t| entry.entry_type == t).unwrap_or(true)
                && agent
                    .map(|a| entry.agent_name.as_deref() == Some(a))
                    .unwrap_or(true)
        });
        entries.sort_by(|a, b| b.at.cmp(&a.at).then(a.reference_id.cmp(&b.reference_id)));
        entries
    }
}
