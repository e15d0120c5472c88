//! Storage port for learning profiles.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::profile::AgentLearningProfile;

#[async_trait]
pub trait LearningProfileRepository: Send + Sync {
    async fn get(&self, agent: &str) -> Option<AgentLearningProfile>;

    async fn get_or_create(&self, agent: &str) -> AgentLearningProfile;

    async fn save(&self, profile: AgentLearningProfile);

    async fn list(&self) -> Vec<AgentLearningProfile>;
}

/// In-memory profile store.
#[derive(Default)]
pub struct InMemoryLearningProfileRepository {
    profiles: RwLock<HashMap<String, AgentLearningProfile>>,
}

impl InMemoryLearningProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook.
    pub async fn clear(&self) {
        self.profiles.write().await.clear();
    }
}

#[async_trait]
impl LearningProfileRepository for InMemoryLearningProfileRepository {
    async fn get(&self, agent: &str) -> Option<AgentLearningProfile> {
        self.profiles.read().await.get(agent).cloned()
    }

    async fn get_or_create(&self, agent: &str) -> AgentLearningProfile {
        if let Some(profile) = self.profiles.read().await.get(agent) {
            return profile.clone();
        }
        let mut profiles = self.profiles.write().await;
        profiles
            .entry(agent.to_string())
            .or_insert_with(|| AgentLearningProfile::new(agent))
            .clone()
    }

    async fn save(&self, profile: AgentLearningProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.agent_name.clone(), profile);
    }

    async fn list(&self) -> Vec<AgentLearningProfile> {
        let mut profiles: Vec<AgentLearningProfile> =
            self.profiles.read().await.values().cloned().collect();
        profiles.sort_by(|a, b| a.agent_name.cmp(&b.agent_name));
        profiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let repo = InMemoryLearningProfileRepository::new();
        let first = repo.get_or_create("Coach").await;
        let second = repo.get_or_create("Coach").await;
        assert_eq!(first.agent_name, second.agent_name);
        assert_eq!(repo.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let repo = InMemoryLearningProfileRepository::new();
        let mut profile = repo.get_or_create("Coach").await;
        profile.total_feedback_received = 7;
        repo.save(profile).await;

        assert_eq!(repo.get("Coach").await.unwrap().total_feedback_received, 7);
    }
}
