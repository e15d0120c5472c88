//! Storage ports for proposals, conflicts, policies and decisions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::decision::ArbitrationDecision;
use crate::error::ArbiterError;
use crate::policy::{ArbitrationPolicy, PolicyScope};
use crate::types::{AgentActionProposal, Conflict, ProposalStatus};

#[async_trait]
pub trait ProposalRepository: Send + Sync {
    async fn save(&self, proposal: AgentActionProposal);

    async fn get(&self, id: Uuid) -> Option<AgentActionProposal>;

    /// Record the single status transition away from `Pending`.
    async fn update_status(
        &self,
        id: Uuid,
        status: ProposalStatus,
        decision_id: Option<Uuid>,
    ) -> Result<AgentActionProposal, ArbiterError>;

    async fn list_pending(&self) -> Vec<AgentActionProposal>;

    async fn list_by_ids(&self, ids: &[Uuid]) -> Vec<AgentActionProposal>;

    async fn list_by_decision(&self, decision_id: Uuid) -> Vec<AgentActionProposal>;

    async fn list_all(&self) -> Vec<AgentActionProposal>;
}

#[async_trait]
pub trait ConflictRepository: Send + Sync {
    async fn save(&self, conflict: Conflict);

    async fn get(&self, id: Uuid) -> Option<Conflict>;

    async fn mark_resolved(&self, id: Uuid) -> Result<Conflict, ArbiterError>;

    async fn list_unresolved(&self) -> Vec<Conflict>;

    async fn list_all(&self) -> Vec<Conflict>;
}

#[async_trait]
pub trait ArbitrationPolicyRepository: Send + Sync {
    async fn save(&self, policy: ArbitrationPolicy);

    async fn find_by_preference(&self, dotted_key: &str) -> Option<ArbitrationPolicy>;

    async fn find_by_agent(&self, agent: &str) -> Option<ArbitrationPolicy>;

    async fn find_default(&self) -> Option<ArbitrationPolicy>;

    async fn get(&self, id: Uuid) -> Option<ArbitrationPolicy>;

    async fn list(&self) -> Vec<ArbitrationPolicy>;
}

#[async_trait]
pub trait ArbitrationDecisionRepository: Send + Sync {
    async fn save(&self, decision: ArbitrationDecision);

    async fn get(&self, id: Uuid) -> Option<ArbitrationDecision>;

    async fn list_all(&self) -> Vec<ArbitrationDecision>;

    async fn list_open_escalations(&self) -> Vec<ArbitrationDecision>;

    async fn list_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<ArbitrationDecision>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATIONS
// ============================================================================

/// In-memory proposal store, insertion-ordered.
#[derive(Default)]
pub struct InMemoryProposalRepository {
    proposals: RwLock<Vec<AgentActionProposal>>,
}

impl InMemoryProposalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn clear(&self) {
        self.proposals.write().await.clear();
    }
}

#[async_trait]
impl ProposalRepository for InMemoryProposalRepository {
    async fn save(&self, proposal: AgentActionProposal) {
        let mut proposals = self.proposals.write().await;
        if let Some(existing) = proposals.iter_mut().find(|p| p.id == proposal.id) {
            *existing = proposal;
        } else {
            proposals.push(proposal);
        }
    }

    async fn get(&self, id: Uuid) -> Option<AgentActionProposal> {
        self.proposals.read().await.iter().find(|p| p.id == id).cloned()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: ProposalStatus,
        decision_id: Option<Uuid>,
    ) -> Result<AgentActionProposal, ArbiterError> {
        let mut proposals = self.proposals.write().await;
        let proposal = proposals
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(ArbiterError::ProposalNotFound(id))?;
        proposal.status = status;
        if decision_id.is_some() {
            proposal.decision_id = decision_id;
        }
        Ok(proposal.clone())
    }

    async fn list_pending(&self) -> Vec<AgentActionProposal> {
        self.proposals
            .read()
            .await
            .iter()
            .filter(|p| p.status == ProposalStatus::Pending)
            .cloned()
            .collect()
    }

    async fn list_by_ids(&self, ids: &[Uuid]) -> Vec<AgentActionProposal> {
        let proposals = self.proposals.read().await;
        ids.iter()
            .filter_map(|id| proposals.iter().find(|p| p.id == *id).cloned())
            .collect()
    }

    async fn list_by_decision(&self, decision_id: Uuid) -> Vec<AgentActionProposal> {
        self.proposals
            .read()
            .await
            .iter()
            .filter(|p| p.decision_id == Some(decision_id))
            .cloned()
            .collect()
    }

    async fn list_all(&self) -> Vec<AgentActionProposal> {
        self.proposals.read().await.clone()
    }
}

/// In-memory conflict store.
#[derive(Default)]
pub struct InMemoryConflictRepository {
    conflicts: RwLock<Vec<Conflict>>,
}

impl InMemoryConflictRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConflictRepository for InMemoryConflictRepository {
    async fn save(&self, conflict: Conflict) {
        let mut conflicts = self.conflicts.write().await;
        if let Some(existing) = conflicts.iter_mut().find(|c| c.id == conflict.id) {
            *existing = conflict;
        } else {
            conflicts.push(conflict);
        }
    }

    async fn get(&self, id: Uuid) -> Option<Conflict> {
        self.conflicts.read().await.iter().find(|c| c.id == id).cloned()
    }

    async fn mark_resolved(&self, id: Uuid) -> Result<Conflict, ArbiterError> {
        let mut conflicts = self.conflicts.write().await;
        let conflict = conflicts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(ArbiterError::ConflictNotFound(id))?;
        conflict.resolved = true;
        Ok(conflict.clone())
    }

    async fn list_unresolved(&self) -> Vec<Conflict> {
        self.conflicts
            .read()
            .await
            .iter()
            .filter(|c| !c.resolved)
            .cloned()
            .collect()
    }

    async fn list_all(&self) -> Vec<Conflict> {
        self.conflicts.read().await.clone()
    }
}

/// In-memory policy store.
#[derive(Default)]
pub struct InMemoryArbitrationPolicyRepository {
    policies: RwLock<HashMap<Uuid, ArbitrationPolicy>>,
}

impl InMemoryArbitrationPolicyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArbitrationPolicyRepository for InMemoryArbitrationPolicyRepository {
    async fn save(&self, policy: ArbitrationPolicy) {
        self.policies.write().await.insert(policy.id, policy);
    }

    async fn find_by_preference(&self, dotted_key: &str) -> Option<ArbitrationPolicy> {
        self.policies
            .read()
            .await
            .values()
            .find(|p| p.scope == PolicyScope::Preference(dotted_key.to_string()))
            .cloned()
    }

    async fn find_by_agent(&self, agent: &str) -> Option<ArbitrationPolicy> {
        self.policies
            .read()
            .await
            .values()
            .find(|p| p.scope == PolicyScope::Agent(agent.to_string()))
            .cloned()
    }

    async fn find_default(&self) -> Option<ArbitrationPolicy> {
        self.policies
            .read()
            .await
            .values()
            .find(|p| p.is_default)
            .cloned()
    }

    async fn get(&self, id: Uuid) -> Option<ArbitrationPolicy> {
        self.policies.read().await.get(&id).cloned()
    }

    async fn list(&self) -> Vec<ArbitrationPolicy> {
        self.policies.read().await.values().cloned().collect()
    }
}

/// In-memory decision store, insertion-ordered.
#[derive(Default)]
pub struct InMemoryArbitrationDecisionRepository {
    decisions: RwLock<Vec<ArbitrationDecision>>,
}

impl InMemoryArbitrationDecisionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArbitrationDecisionRepository for InMemoryArbitrationDecisionRepository {
    async fn save(&self, decision: ArbitrationDecision) {
        let mut decisions = self.decisions.write().await;
        if let Some(existing) = decisions.iter_mut().find(|d| d.id == decision.id) {
            *existing = decision;
        } else {
            decisions.push(decision);
        }
    }

    async fn get(&self, id: Uuid) -> Option<ArbitrationDecision> {
        self.decisions.read().await.iter().find(|d| d.id == id).cloned()
    }

    async fn list_all(&self) -> Vec<ArbitrationDecision> {
        self.decisions.read().await.clone()
    }

    async fn list_open_escalations(&self) -> Vec<ArbitrationDecision> {
        self.decisions
            .read()
            .await
            .iter()
            .filter(|d| d.is_open_escalation())
            .cloned()
            .collect()
    }

    async fn list_between(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Vec<ArbitrationDecision> {
        self.decisions
            .read()
            .await
            .iter()
            .filter(|d| d.created_at >= since && d.created_at <= until)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TargetRef;
    use serde_json::json;

    #[tokio::test]
    async fn test_proposal_status_update() {
        let repo = InMemoryProposalRepository::new();
        let proposal = AgentActionProposal::new(
            "Coach",
            "preference_change",
            TargetRef::preference("user-1", "communication.tone"),
            json!("neutral"),
        );
        let id = proposal.id;
        repo.save(proposal).await;

        let decision_id = Uuid::new_v4();
        let updated = repo
            .update_status(id, ProposalStatus::Approved, Some(decision_id))
            .await
            .unwrap();
        assert_eq!(updated.status, ProposalStatus::Approved);
        assert_eq!(updated.decision_id, Some(decision_id));
        assert!(repo.list_pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_policy_scope_lookup() {
        let repo = InMemoryArbitrationPolicyRepository::new();
        repo.save(
            ArbitrationPolicy::new(
                PolicyScope::Preference("communication.tone".to_string()),
                crate::policy::ResolutionStrategy::Priority,
            ),
        )
        .await;
        repo.save(
            ArbitrationPolicy::new(
                PolicyScope::Agent("Coach".to_string()),
                crate::policy::ResolutionStrategy::Weighted,
            ),
        )
        .await;
        repo.save(ArbitrationPolicy::fallback_default()).await;

        assert!(repo.find_by_preference("communication.tone").await.is_some());
        assert!(repo.find_by_preference("other.key").await.is_none());
        assert!(repo.find_by_agent("Coach").await.is_some());
        assert!(repo.find_default().await.is_some());
    }

    #[tokio::test]
    async fn test_open_escalations_listing() {
        let repo = InMemoryArbitrationDecisionRepository::new();
        let mut escalated = ArbitrationDecision::new(
            None,
            Uuid::new_v4(),
            crate::policy::ResolutionStrategy::Priority,
            crate::decision::ArbitrationOutcome::Escalated,
        );
        escalated.requires_human_approval = true;
        repo.save(escalated.clone()).await;

        assert_eq!(repo.list_open_escalations().await.len(), 1);

        escalated.executed = true;
        repo.save(escalated).await;
        assert!(repo.list_open_escalations().await.is_empty());
    }
}
