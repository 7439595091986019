//! Store migration monitor.
//!
//! Polls every 10 seconds for stores mid-migration on a cluster this node
//! leads, and flips `StoreConfig.cluster` to the destination once the
//! destination has caught up to (or passed) the source's latest `ONLINE`
//! version. Every iteration swallows its own errors so one bad store or
//! a transient metadata-store outage never kills the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};
use venice_controller_types::VersionStatus;

use crate::locks::ClusterLockRegistry;
use crate::mastership::MastershipController;
use crate::metadata_store::MetadataStore;
use crate::resource_coordinator::ResourceCoordinator;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

fn latest_online_version(store: &venice_controller_types::Store) -> Option<u32> {
    store
        .versions
        .iter()
        .filter(|v| v.status == VersionStatus::Online)
        .map(|v| v.number)
        .max()
}

/// Background worker that completes cross-cluster store migrations once
/// the destination cluster has caught up.
pub struct StoreMigrationMonitor<M: MetadataStore, R: ResourceCoordinator> {
    metadata: Arc<M>,
    mastership: Arc<MastershipController<R>>,
    locks: Arc<ClusterLockRegistry>,
    poll_interval: Duration,
}

impl<M, R> StoreMigrationMonitor<M, R>
where
    M: MetadataStore + 'static,
    R: ResourceCoordinator + 'static,
{
    #[must_use]
    pub fn new(metadata: Arc<M>, mastership: Arc<MastershipController<R>>, locks: Arc<ClusterLockRegistry>) -> Self {
        Self {
            metadata,
            mastership,
            locks,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs until `shutdown` fires. Intended to be spawned as a long-lived
    /// task per controller process.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                () = tokio::time::sleep(self.poll_interval) => {
                    self.scan_once().await;
                }
            }
        }
    }

    /// Runs one sweep immediately, without waiting for the poll interval.
    /// Exposed for tests and for an explicit "check now" admin hook.
    pub async fn scan_once(&self) {
        for cluster in self.mastership.registered_clusters() {
            if !self.mastership.is_leader(&cluster) {
                continue;
            }
            if let Err(e) = self.scan_cluster(&cluster).await {
                warn!(cluster = %cluster, error = %e, "store migration scan failed for cluster");
            }
        }
    }

    async fn scan_cluster(&self, cluster: &str) -> Result<(), venice_controller_types::ControllerError> {
        let stores = self.metadata.list_stores(cluster).await?;
        for store in stores {
            if !store.migrating {
                continue;
            }

            let _guard = self.locks.metadata_read(cluster).await;
            let Ok(cfg) = self.metadata.get_store_config(&store.store_name).await else {
                continue;
            };
            let (Some(src), Some(dest)) = (cfg.migration_src.clone(), cfg.migration_dest.clone()) else {
                continue;
            };
            if cfg.cluster != src {
                continue;
            }

            let Ok(src_stamped) = self.metadata.get_store(&src, &store.store_name).await else {
                continue;
            };
            let Ok(dest_stamped) = self.metadata.get_store(&dest, &store.store_name).await else {
                continue;
            };

            let src_latest = latest_online_version(&src_stamped.store);
            let dest_latest = latest_online_version(&dest_stamped.store);

            if dest_latest.is_some() && dest_latest >= src_latest {
                let mut updated = cfg;
                updated.cluster = dest.clone();
                self.metadata.put_store_config(updated).await?;
                info!(store = %store.store_name, src, dest, "store migration cut over to destination cluster");
            }
        }
        Ok(())
    }
}
