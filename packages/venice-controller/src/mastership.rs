//! Mastership controller.
//!
//! Attaches this process as a participant to a meta-cluster whose
//! resources are the managed clusters, one partition-1 resource per
//! managed cluster under a leader/standby state model. Leader state is
//! latched in an `ArcSwap<bool>` per cluster -- a lock-free health-state
//! machine kept current by a background poll task that is cancelled
//! through a per-cluster `watch` channel rather than detached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use venice_controller_types::ControllerError;

use crate::resource_coordinator::{ClusterTopology, Rebalancer, ResourceCoordinator};
use crate::ControllerResult;

const LEADER_STATE: &str = "LEADER";

struct ClusterHandle {
    leader: Arc<ArcSwap<bool>>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct MastershipController<R: ResourceCoordinator> {
    coordinator: Arc<R>,
    node_id: String,
    meta_cluster: String,
    join_timeout: Duration,
    poll_interval: Duration,
    handles: Mutex<HashMap<String, ClusterHandle>>,
    last_exception: Arc<DashMap<String, String>>,
}

impl<R: ResourceCoordinator + 'static> MastershipController<R> {
    #[must_use]
    pub fn new(coordinator: Arc<R>, node_id: impl Into<String>, meta_cluster: impl Into<String>) -> Self {
        Self {
            coordinator,
            node_id: node_id.into(),
            meta_cluster: meta_cluster.into(),
            join_timeout: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_millis(500),
            handles: Mutex::new(HashMap::new()),
            last_exception: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn with_timings(mut self, join_timeout: Duration, poll_interval: Duration) -> Self {
        self.join_timeout = join_timeout;
        self.poll_interval = poll_interval;
        self
    }

    /// Enables this node's partition for `cluster` and blocks until it
    /// becomes leader or `join_timeout` elapses.
    ///
    /// # Errors
    /// `JoinTimeout` if leadership is not acquired before the deadline.
    pub async fn start(&self, cluster: &str) -> ControllerResult<()> {
        if self.handles.lock().contains_key(cluster) {
            return Ok(());
        }

        match self
            .coordinator
            .ensure_cluster(&self.meta_cluster, ClusterTopology::default())
            .await
        {
            Ok(()) | Err(ControllerError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }
        match self
            .coordinator
            .add_resource(&self.meta_cluster, cluster, 1, 1, "LeaderStandby", Rebalancer::default(), 1)
            .await
        {
            Ok(()) | Err(ControllerError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }
        self.coordinator
            .enable_partition(&self.meta_cluster, &self.node_id, cluster, "0", true)
            .await?;

        let leader = Arc::new(ArcSwap::from_pointee(false));
        let deadline = tokio::time::Instant::now() + self.join_timeout;

        loop {
            if self.poll_leadership(cluster, &leader).await {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ControllerError::JoinTimeout {
                    cluster: cluster.to_string(),
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        info!(cluster, node = %self.node_id, "acquired mastership");

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let coordinator = self.coordinator.clone();
        let node_id = self.node_id.clone();
        let meta_cluster = self.meta_cluster.clone();
        let poll_interval = self.poll_interval;
        let cluster_owned = cluster.to_string();
        let task_leader = leader.clone();
        let last_exception = self.last_exception.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    () = tokio::time::sleep(poll_interval) => {
                        match coordinator.read_external_view(&meta_cluster, &cluster_owned).await {
                            Ok(view) => {
                                let is_leader = view
                                    .partitions
                                    .get(&0)
                                    .and_then(|replicas| replicas.get(&node_id))
                                    .is_some_and(|state| state == LEADER_STATE);
                                task_leader.store(Arc::new(is_leader));
                            }
                            Err(e) => {
                                warn!(cluster = %cluster_owned, error = %e, "mastership poll failed");
                                last_exception.insert(cluster_owned.clone(), e.to_string());
                            }
                        }
                    }
                }
            }
        });

        self.handles.lock().insert(
            cluster.to_string(),
            ClusterHandle {
                leader,
                shutdown_tx,
                task,
            },
        );

        Ok(())
    }

    async fn poll_leadership(&self, cluster: &str, leader: &Arc<ArcSwap<bool>>) -> bool {
        match self.coordinator.read_external_view(&self.meta_cluster, cluster).await {
            Ok(view) => {
                let is_leader = view
                    .partitions
                    .get(&0)
                    .and_then(|replicas| replicas.get(&self.node_id))
                    .is_some_and(|state| state == LEADER_STATE);
                leader.store(Arc::new(is_leader));
                is_leader
            }
            Err(e) => {
                self.last_exception.insert(cluster.to_string(), e.to_string());
                false
            }
        }
    }

    #[must_use]
    pub fn is_leader(&self, cluster: &str) -> bool {
        self.handles
            .lock()
            .get(cluster)
            .is_some_and(|h| **h.leader.load())
    }

    /// Disables this node's partition for `cluster` and cancels its poll task.
    pub async fn stop(&self, cluster: &str) -> ControllerResult<()> {
        let handle = self.handles.lock().remove(cluster);
        if let Some(handle) = handle {
            let _ = handle.shutdown_tx.send(true);
            handle.task.abort();
        }
        self.coordinator
            .enable_partition(&self.meta_cluster, &self.node_id, cluster, "0", false)
            .await
    }

    /// # Errors
    /// `NotLeader` if this node is not currently leader for `cluster`.
    pub fn require_leader(&self, cluster: &str) -> ControllerResult<()> {
        if self.is_leader(cluster) {
            Ok(())
        } else {
            Err(ControllerError::NotLeader {
                cluster: cluster.to_string(),
            })
        }
    }

    #[must_use]
    pub fn registered_clusters(&self) -> Vec<String> {
        self.handles.lock().keys().cloned().collect()
    }

    #[must_use]
    pub fn last_exception(&self, cluster: &str) -> Option<String> {
        self.last_exception.get(cluster).map(|e| e.clone())
    }
}

impl<R: ResourceCoordinator> Drop for MastershipController<R> {
    fn drop(&mut self) {
        for (_, handle) in self.handles.lock().drain() {
            handle.task.abort();
        }
    }
}
