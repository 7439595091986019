//! Per-cluster and per-store lock registry.
//!
//! Every lifecycle operation takes the cluster's metadata operation lock
//! (write for mutations, read for listings) plus the target store's
//! repository lock. Both are lazily created on first use and held for the
//! lifetime of the controller.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Lazily-created per-cluster and per-store async locks.
///
/// Lock ordering is always metadata lock first, store lock second -- never
/// the reverse, to avoid deadlock between concurrent operations on
/// different stores in the same cluster.
#[derive(Default)]
pub struct ClusterLockRegistry {
    metadata_locks: DashMap<String, Arc<RwLock<()>>>,
    store_locks: DashMap<(String, String), Arc<RwLock<()>>>,
}

impl ClusterLockRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            metadata_locks: DashMap::new(),
            store_locks: DashMap::new(),
        }
    }

    fn metadata_lock(&self, cluster: &str) -> Arc<RwLock<()>> {
        self.metadata_locks
            .entry(cluster.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    fn store_lock(&self, cluster: &str, store: &str) -> Arc<RwLock<()>> {
        self.store_locks
            .entry((cluster.to_string(), store.to_string()))
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    pub async fn metadata_write(&self, cluster: &str) -> OwnedRwLockWriteGuard<()> {
        self.metadata_lock(cluster).write_owned().await
    }

    pub async fn metadata_read(&self, cluster: &str) -> OwnedRwLockReadGuard<()> {
        self.metadata_lock(cluster).read_owned().await
    }

    pub async fn store_write(&self, cluster: &str, store: &str) -> OwnedRwLockWriteGuard<()> {
        self.store_lock(cluster, store).write_owned().await
    }

    pub async fn store_read(&self, cluster: &str, store: &str) -> OwnedRwLockReadGuard<()> {
        self.store_lock(cluster, store).read_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn metadata_locks_are_exclusive_across_writers() {
        let registry = Arc::new(ClusterLockRegistry::new());
        let guard = registry.metadata_write("cluster-a").await;

        let registry2 = registry.clone();
        let handle = tokio::spawn(async move {
            let _g = registry2.metadata_write("cluster-a").await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        drop(guard);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn locks_for_different_clusters_are_independent() {
        let registry = ClusterLockRegistry::new();
        let _a = registry.metadata_write("cluster-a").await;
        // Should not block: distinct cluster key.
        let _b = tokio::time::timeout(std::time::Duration::from_millis(50), registry.metadata_write("cluster-b"))
            .await
            .expect("lock for a different cluster must not contend");
    }

    #[tokio::test]
    async fn store_locks_are_scoped_per_cluster_and_store() {
        let registry = ClusterLockRegistry::new();
        let _a = registry.store_write("cluster-a", "orders").await;
        let _b = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            registry.store_write("cluster-a", "inventory"),
        )
        .await
        .expect("lock for a different store must not contend");
    }
}
