//! Store backup version cleanup loop.
//!
//! Periodically retires old store versions for every store in every
//! cluster this node leads, so deprecated version topics
//! get their retention lowered even without a push ever touching them
//! again. Each store is handled independently; one failure does not stop
//! the sweep of the rest.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::warn;

use crate::lifecycle::StoreLifecycleEngine;
use crate::mastership::MastershipController;
use crate::metadata_store::MetadataStore;
use crate::resource_coordinator::ResourceCoordinator;
use crate::topic_manager::TopicManager;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub struct StoreBackupVersionCleanup<M: MetadataStore, R: ResourceCoordinator, T: TopicManager> {
    metadata: Arc<M>,
    mastership: Arc<MastershipController<R>>,
    engine: Arc<StoreLifecycleEngine<M, R, T>>,
    poll_interval: Duration,
}

impl<M, R, T> StoreBackupVersionCleanup<M, R, T>
where
    M: MetadataStore + 'static,
    R: ResourceCoordinator + 'static,
    T: TopicManager + 'static,
{
    #[must_use]
    pub fn new(
        metadata: Arc<M>,
        mastership: Arc<MastershipController<R>>,
        engine: Arc<StoreLifecycleEngine<M, R, T>>,
    ) -> Self {
        Self {
            metadata,
            mastership,
            engine,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                () = tokio::time::sleep(self.poll_interval) => {
                    self.sweep_once().await;
                }
            }
        }
    }

    async fn sweep_once(&self) {
        for cluster in self.mastership.registered_clusters() {
            if !self.mastership.is_leader(&cluster) {
                continue;
            }

            let stores = match self.metadata.list_stores(&cluster).await {
                Ok(stores) => stores,
                Err(e) => {
                    warn!(cluster = %cluster, error = %e, "could not list stores for version cleanup");
                    continue;
                }
            };

            for store in stores {
                if let Err(e) = self.engine.retire_old_store_versions(&cluster, &store.store_name).await {
                    warn!(cluster = %cluster, store = %store.store_name, error = %e, "retire_old_store_versions failed");
                }
            }
        }
    }
}
