//! Resource coordinator adapter contract.
//!
//! The coordinator owns *resources* (one per store-version), their
//! partition maps, and per-partition replica state machines, plus the
//! meta-cluster leader/standby partitions the mastership controller rides
//! on. A narrow `async_trait` the lifecycle engine depends on, with a
//! swappable in-memory adapter for tests.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;

use crate::ControllerResult;

/// Replica state as reported by a resource's external view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalView {
    /// `partitionId -> (instanceId -> state)`.
    pub partitions: BTreeMap<u32, BTreeMap<String, String>>,
}

impl ExternalView {
    #[must_use]
    pub fn assigned_replica_count(&self, partition: u32) -> usize {
        self.partitions.get(&partition).map_or(0, BTreeMap::len)
    }
}

/// Cluster-level configuration passed to `ensure_cluster`.
#[derive(Debug, Clone)]
pub struct ClusterTopology {
    pub auto_join_allowed: bool,
    pub delayed_rebalance_ms: u64,
    /// Minimum active replicas a resource's partitions must keep before the
    /// coordinator triggers a rebalance; `addResource` reads this for every
    /// resource registered under the cluster.
    pub min_active_replicas: u32,
}

impl Default for ClusterTopology {
    fn default() -> Self {
        Self {
            auto_join_allowed: false,
            delayed_rebalance_ms: 0,
            min_active_replicas: 1,
        }
    }
}

/// The delayed-auto-rebalance strategy `addResource` registers a resource
/// under. A cluster with a nonzero `delayed_rebalance_ms` tolerates a
/// replica going offline for that long before the coordinator reassigns
/// its partitions to a different instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rebalancer {
    pub delayed_rebalance_ms: u64,
}

#[async_trait]
pub trait ResourceCoordinator: Send + Sync {
    /// Idempotent cluster creation plus cluster-level config.
    async fn ensure_cluster(&self, cluster: &str, topology: ClusterTopology) -> ControllerResult<()>;

    /// Reads the topology most recently passed to `ensure_cluster` for
    /// `cluster`, or `ClusterTopology::default()` if the cluster hasn't
    /// been registered yet.
    async fn get_cluster_topology(&self, cluster: &str) -> ControllerResult<ClusterTopology>;

    /// `AlreadyExists` if the resource is already present.
    async fn add_resource(
        &self,
        cluster: &str,
        resource: &str,
        partition_count: u32,
        replication_factor: u32,
        state_model_name: &str,
        rebalancer: Rebalancer,
        min_active_replicas: u32,
    ) -> ControllerResult<()>;

    /// Idempotent.
    async fn drop_resource(&self, cluster: &str, resource: &str) -> ControllerResult<()>;

    /// Lists every resource name currently registered in `cluster`. Needed
    /// for the coordinator-resource scan in
    /// `check_resource_cleanup_before_store_creation`,
    /// which the adapter contract in §4.2 doesn't otherwise name.
    async fn list_resources(&self, cluster: &str) -> ControllerResult<Vec<String>>;

    async fn enable_partition(
        &self,
        cluster: &str,
        participant: &str,
        resource: &str,
        partition_name: &str,
        enabled: bool,
    ) -> ControllerResult<()>;

    async fn read_external_view(&self, cluster: &str, resource: &str) -> ControllerResult<ExternalView>;

    async fn live_instances(&self, cluster: &str) -> ControllerResult<HashSet<String>>;

    /// Blocks until at least `replication_factor` replicas are assigned to
    /// every partition of `resource`, or times out with `JoinTimeout`-shaped
    /// `CoordinatorUnavailable` semantics (the caller treats a timeout here
    /// as retryable-at-the-caller).
    async fn wait_for_assignment(
        &self,
        cluster: &str,
        resource: &str,
        replication_factor: u32,
        timeout: Duration,
    ) -> ControllerResult<()>;

    /// Fire-and-forget kill/notify broadcast. `retries` bounds delivery
    /// attempts; failures are logged, never propagated.
    async fn send_message_to_participants(
        &self,
        cluster: &str,
        resource: &str,
        message: &str,
        retries: u32,
    );
}
