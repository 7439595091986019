//! In-memory resource coordinator adapter.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;
use venice_controller_types::ControllerError;

use super::traits::{ClusterTopology, ExternalView, Rebalancer, ResourceCoordinator};
use crate::ControllerResult;

struct ResourceRow {
    partition_count: u32,
    replication_factor: u32,
    /// `partitionId -> (instanceId -> state)`.
    assignments: BTreeMap<u32, BTreeMap<String, String>>,
}

/// In-memory `ResourceCoordinator`. Resources start unassigned;
/// `simulate_full_assignment` drives them to fully replicated so tests can
/// exercise `wait_for_assignment` without a real cluster manager.
pub struct InMemoryResourceCoordinator {
    clusters: DashMap<String, ClusterTopology>,
    resources: DashMap<(String, String), ResourceRow>,
    live_instances: DashMap<String, HashSet<String>>,
    unavailable: AtomicBool,
}

impl InMemoryResourceCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            clusters: DashMap::new(),
            resources: DashMap::new(),
            live_instances: DashMap::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Test hook: force every subsequent call to fail with
    /// `CoordinatorUnavailable` until called again with `false`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Test/simulation hook: assigns `replication_factor` distinct replicas
    /// to every partition of a resource, all in state `ONLINE`.
    pub fn simulate_full_assignment(&self, cluster: &str, resource: &str) {
        if let Some(mut row) = self.resources.get_mut(&(cluster.to_string(), resource.to_string())) {
            let rf = row.replication_factor;
            let partition_count = row.partition_count;
            for p in 0..partition_count {
                let replicas = row.assignments.entry(p).or_default();
                for r in 0..rf {
                    replicas.insert(format!("instance-{r}"), "ONLINE".to_string());
                }
            }
        }
    }

    /// Test/simulation hook: grants leadership of partition 0 of `resource`
    /// to `instance_id`, the shape `MastershipController` polls for.
    pub fn grant_leader(&self, cluster: &str, resource: &str, instance_id: &str) {
        let mut row = self
            .resources
            .entry((cluster.to_string(), resource.to_string()))
            .or_insert_with(|| ResourceRow {
                partition_count: 1,
                replication_factor: 1,
                assignments: BTreeMap::new(),
            });
        let replicas = row.assignments.entry(0).or_default();
        replicas.retain(|_, state| state != "LEADER");
        replicas.insert(instance_id.to_string(), "LEADER".to_string());
    }

    pub fn register_live_instance(&self, cluster: &str, instance: &str) {
        self.live_instances
            .entry(cluster.to_string())
            .or_default()
            .insert(instance.to_string());
    }

    fn check_available(&self) -> ControllerResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ControllerError::CoordinatorUnavailable(
                "simulated coordinator outage".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for InMemoryResourceCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceCoordinator for InMemoryResourceCoordinator {
    async fn ensure_cluster(&self, cluster: &str, topology: ClusterTopology) -> ControllerResult<()> {
        self.check_available()?;
        self.clusters.insert(cluster.to_string(), topology);
        Ok(())
    }

    async fn get_cluster_topology(&self, cluster: &str) -> ControllerResult<ClusterTopology> {
        self.check_available()?;
        Ok(self.clusters.get(cluster).map(|t| t.clone()).unwrap_or_default())
    }

    async fn add_resource(
        &self,
        cluster: &str,
        resource: &str,
        partition_count: u32,
        replication_factor: u32,
        _state_model_name: &str,
        _rebalancer: Rebalancer,
        _min_active_replicas: u32,
    ) -> ControllerResult<()> {
        self.check_available()?;
        let key = (cluster.to_string(), resource.to_string());
        if self.resources.contains_key(&key) {
            return Err(ControllerError::AlreadyExists(format!(
                "resource '{resource}' in cluster '{cluster}'"
            )));
        }
        self.resources.insert(
            key,
            ResourceRow {
                partition_count,
                replication_factor,
                assignments: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn drop_resource(&self, cluster: &str, resource: &str) -> ControllerResult<()> {
        self.check_available()?;
        self.resources.remove(&(cluster.to_string(), resource.to_string()));
        Ok(())
    }

    async fn list_resources(&self, cluster: &str) -> ControllerResult<Vec<String>> {
        self.check_available()?;
        Ok(self
            .resources
            .iter()
            .filter(|entry| entry.key().0 == cluster)
            .map(|entry| entry.key().1.clone())
            .collect())
    }

    async fn enable_partition(
        &self,
        cluster: &str,
        participant: &str,
        resource: &str,
        partition_name: &str,
        enabled: bool,
    ) -> ControllerResult<()> {
        self.check_available()?;
        // A no-op in the in-memory adapter beyond observability: real
        // coordinators route this to the participant's state model.
        let _ = (cluster, participant, resource, partition_name, enabled);
        Ok(())
    }

    async fn read_external_view(&self, cluster: &str, resource: &str) -> ControllerResult<ExternalView> {
        self.check_available()?;
        let row = self
            .resources
            .get(&(cluster.to_string(), resource.to_string()))
            .ok_or_else(|| ControllerError::NotFound(format!("resource '{resource}' in cluster '{cluster}'")))?;
        Ok(ExternalView {
            partitions: row.assignments.clone(),
        })
    }

    async fn live_instances(&self, cluster: &str) -> ControllerResult<HashSet<String>> {
        self.check_available()?;
        Ok(self.live_instances.get(cluster).map(|s| s.clone()).unwrap_or_default())
    }

    async fn wait_for_assignment(
        &self,
        cluster: &str,
        resource: &str,
        replication_factor: u32,
        timeout: Duration,
    ) -> ControllerResult<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.check_available()?;
            let satisfied = {
                let row = self
                    .resources
                    .get(&(cluster.to_string(), resource.to_string()))
                    .ok_or_else(|| {
                        ControllerError::NotFound(format!("resource '{resource}' in cluster '{cluster}'"))
                    })?;
                (0..row.partition_count).all(|p| {
                    row.assignments
                        .get(&p)
                        .is_some_and(|replicas| replicas.len() as u32 >= replication_factor)
                })
            };

            if satisfied {
                return Ok(());
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(cluster, resource, "timed out waiting for resource assignment");
                return Err(ControllerError::CoordinatorUnavailable(format!(
                    "timed out waiting for assignment of '{resource}'"
                )));
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn send_message_to_participants(&self, cluster: &str, resource: &str, message: &str, retries: u32) {
        if self.check_available().is_err() {
            warn!(cluster, resource, message, retries, "dropped participant message, coordinator unavailable");
        }
    }
}
