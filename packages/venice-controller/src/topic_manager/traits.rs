//! Topic manager adapter contract.
//!
//! Version topics are deprecated, never hard-deleted: `update_retention`
//! down to a small `deprecated_retention_ms` is the only sanctioned
//! removal mechanism, so slow consumers finish before the retaining
//! message bus drops the segment.

use async_trait::async_trait;

use crate::ControllerResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicInfo {
    pub name: String,
    pub partition_count: u32,
    pub replication_factor: u32,
    pub retention_ms: u64,
}

#[async_trait]
pub trait TopicManager: Send + Sync {
    async fn list_topics(&self) -> ControllerResult<Vec<TopicInfo>>;

    /// `AlreadyExists` if the topic is already present.
    async fn create_topic(
        &self,
        name: &str,
        partition_count: u32,
        replication_factor: u32,
        retention_ms: u64,
    ) -> ControllerResult<()>;

    async fn contains_topic(&self, name: &str) -> ControllerResult<bool>;

    async fn update_retention(&self, name: &str, retention_ms: u64) -> ControllerResult<()>;

    /// `true` if the topic's current retention is already below `threshold_ms`.
    async fn is_retention_below_threshold(&self, name: &str, threshold_ms: u64) -> ControllerResult<bool>;

    /// Hard delete. Used only for system topics; version/real-time topics
    /// are retired via `update_retention`, never this.
    async fn delete_topic(&self, name: &str) -> ControllerResult<()>;
}
