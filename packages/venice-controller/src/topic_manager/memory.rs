//! In-memory topic manager adapter.

use async_trait::async_trait;
use dashmap::DashMap;
use venice_controller_types::ControllerError;

use super::traits::{TopicInfo, TopicManager};
use crate::ControllerResult;

pub struct InMemoryTopicManager {
    topics: DashMap<String, TopicInfo>,
}

impl InMemoryTopicManager {
    #[must_use]
    pub fn new() -> Self {
        Self { topics: DashMap::new() }
    }
}

impl Default for InMemoryTopicManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TopicManager for InMemoryTopicManager {
    async fn list_topics(&self) -> ControllerResult<Vec<TopicInfo>> {
        Ok(self.topics.iter().map(|entry| entry.value().clone()).collect())
    }

    async fn create_topic(
        &self,
        name: &str,
        partition_count: u32,
        replication_factor: u32,
        retention_ms: u64,
    ) -> ControllerResult<()> {
        if self.topics.contains_key(name) {
            return Err(ControllerError::AlreadyExists(format!("topic '{name}'")));
        }
        self.topics.insert(
            name.to_string(),
            TopicInfo {
                name: name.to_string(),
                partition_count,
                replication_factor,
                retention_ms,
            },
        );
        Ok(())
    }

    async fn contains_topic(&self, name: &str) -> ControllerResult<bool> {
        Ok(self.topics.contains_key(name))
    }

    async fn update_retention(&self, name: &str, retention_ms: u64) -> ControllerResult<()> {
        let mut topic = self
            .topics
            .get_mut(name)
            .ok_or_else(|| ControllerError::NotFound(format!("topic '{name}'")))?;
        topic.retention_ms = retention_ms;
        Ok(())
    }

    async fn is_retention_below_threshold(&self, name: &str, threshold_ms: u64) -> ControllerResult<bool> {
        let topic = self
            .topics
            .get(name)
            .ok_or_else(|| ControllerError::NotFound(format!("topic '{name}'")))?;
        Ok(topic.retention_ms < threshold_ms)
    }

    async fn delete_topic(&self, name: &str) -> ControllerResult<()> {
        self.topics.remove(name);
        Ok(())
    }
}
