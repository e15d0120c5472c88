//! The stock advisory agents: deterministic rule-based handlers that make
//! the plane drivable end-to-end without an AI provider.

use async_trait::async_trait;
use serde_json::json;

use concord_events::DomainEvent;
use concord_governance::{ActionDraft, AdvisoryAgent};
use concord_registry::RiskLevel;

/// Coach reacts to habit activity with encouragement messages and, on
/// repeated skips, proposes a gentler reminder cadence.
pub struct CoachAgent;

#[async_trait]
impl AdvisoryAgent for CoachAgent {
    fn name(&self) -> &str {
        "Coach"
    }

    async fn handle(&self, event: &DomainEvent) -> Vec<ActionDraft> {
        match event.event_type.as_str() {
            "habit.completed" => vec![ActionDraft {
                action_type: "message".to_string(),
                target_kind: "user".to_string(),
                target_id: event.aggregate_id.clone(),
                target_key: None,
                proposed_value: json!({"text": "Nice work, streak extended."}),
                confidence: 0.9,
                cost_estimate: 0.0,
                risk_level: RiskLevel::Low,
                suggestion_id: None,
            }],
            "habit.skipped" => {
                let skips = event.payload["consecutiveSkips"].as_u64().unwrap_or(0);
                if skips < 3 {
                    return Vec::new();
                }
                vec![ActionDraft {
                    action_type: "preference_change".to_string(),
                    target_kind: "preference".to_string(),
                    target_id: "Coach".to_string(),
                    target_key: Some("communication.tone".to_string()),
                    proposed_value: json!("neutral"),
                    confidence: 0.75,
                    cost_estimate: 0.0,
                    risk_level: RiskLevel::Low,
                    suggestion_id: None,
                }]
            }
            _ => Vec::new(),
        }
    }
}

/// Planner proposes reschedules for overdue tasks.
pub struct PlannerAgent;

#[async_trait]
impl AdvisoryAgent for PlannerAgent {
    fn name(&self) -> &str {
        "Planner"
    }

    async fn handle(&self, event: &DomainEvent) -> Vec<ActionDraft> {
        if event.event_type != "task.overdue" {
            return Vec::new();
        }
        let proposed_slot = event.payload["nextFreeSlot"]
            .as_str()
            .unwrap_or("tomorrow-morning");
        vec![ActionDraft {
            action_type: "reschedule".to_string(),
            target_kind: "task".to_string(),
            target_id: event.aggregate_id.clone(),
            target_key: None,
            proposed_value: json!({"slot": proposed_slot}),
            confidence: 0.8,
            cost_estimate: 0.0,
            risk_level: RiskLevel::Medium,
            suggestion_id: None,
        }]
    }
}

/// Logger summarizes the day when it ends.
pub struct LoggerAgent;

#[async_trait]
impl AdvisoryAgent for LoggerAgent {
    fn name(&self) -> &str {
        "Logger"
    }

    async fn handle(&self, event: &DomainEvent) -> Vec<ActionDraft> {
        if event.event_type != "day.ended" {
            return Vec::new();
        }
        let completed = event.payload["completedCount"].as_u64().unwrap_or(0);
        vec![ActionDraft {
            action_type: "log_summary".to_string(),
            target_kind: "journal".to_string(),
            target_id: event.aggregate_id.clone(),
            target_key: None,
            proposed_value: json!({"summary": format!("{completed} items completed today")}),
            confidence: 0.95,
            cost_estimate: 0.0,
            risk_level: RiskLevel::Low,
            suggestion_id: None,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_coach_reacts_to_completion() {
        let drafts = CoachAgent
            .handle(&DomainEvent::new("habit.completed", "user", "user-1", json!({})))
            .await;
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].action_type, "message");
    }

    #[tokio::test]
    async fn test_coach_waits_for_repeated_skips() {
        let few = CoachAgent
            .handle(&DomainEvent::new(
                "habit.skipped",
                "user",
                "user-1",
                json!({"consecutiveSkips": 2}),
            ))
            .await;
        assert!(few.is_empty());

        let many = CoachAgent
            .handle(&DomainEvent::new(
                "habit.skipped",
                "user",
                "user-1",
                json!({"consecutiveSkips": 3}),
            ))
            .await;
        assert_eq!(many.len(), 1);
        assert_eq!(many[0].target_key.as_deref(), Some("communication.tone"));
    }

    #[tokio::test]
    async fn test_planner_ignores_other_events() {
        let drafts = PlannerAgent
            .handle(&DomainEvent::new("habit.completed", "user", "user-1", json!({})))
            .await;
        assert!(drafts.is_empty());
    }
}
