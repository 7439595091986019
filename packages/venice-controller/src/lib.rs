//! Venice cluster controller core.
//!
//! This crate wires together the adapter traits, the mastership
//! controller, the per-cluster lock registry, the store lifecycle engine,
//! and the two background workers defined alongside the domain model in
//! `venice-controller-types`. Nothing here talks to a real message bus or
//! cluster manager -- every adapter has an in-memory implementation
//! suitable for embedding a controller core in a single process or a test.

pub mod background;
pub mod lifecycle;
pub mod locks;
pub mod mastership;
pub mod metadata_store;
pub mod push_status;
pub mod resource_coordinator;
pub mod topic_manager;

/// Every adapter trait and the lifecycle engine return this.
pub type ControllerResult<T> = Result<T, venice_controller_types::ControllerError>;

pub use venice_controller_types::{
    CompressionStrategy, ConfigError, ControllerConfig, ControllerError, GraveyardEntry,
    HybridStoreConfig, SchemaEntry, Store, StoreConfig, Version, VersionStatus,
    DEFAULT_PARTITION_COUNT, IGNORE_VERSION, KEY_SCHEMA_ID, NON_EXISTING_VERSION,
    UNLIMITED_STORAGE_QUOTA,
};

/// Installs a `tracing` subscriber reading the `VENICE_CONTROLLER_LOG`
/// environment variable, defaulting to `info`. Intended for embedding
/// binaries; a library on its own never calls this.
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("VENICE_CONTROLLER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::background::StoreMigrationMonitor;
    use crate::lifecycle::{StoreLifecycleEngine, UpdateStoreOptions};
    use crate::locks::ClusterLockRegistry;
    use crate::mastership::MastershipController;
    use crate::metadata_store::InMemoryMetadataStore;
    use crate::resource_coordinator::{ClusterTopology, InMemoryResourceCoordinator, Rebalancer};
    use crate::topic_manager::InMemoryTopicManager;
    use venice_controller_types::{ControllerConfig, ControllerError, VersionStatus};

    type TestEngine = StoreLifecycleEngine<InMemoryMetadataStore, InMemoryResourceCoordinator, InMemoryTopicManager>;

    struct Fixture {
        engine: Arc<TestEngine>,
        metadata: Arc<InMemoryMetadataStore>,
        coordinator: Arc<InMemoryResourceCoordinator>,
        mastership: Arc<MastershipController<InMemoryResourceCoordinator>>,
        locks: Arc<ClusterLockRegistry>,
    }

    async fn build() -> Fixture {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let coordinator = Arc::new(InMemoryResourceCoordinator::new());
        let topics = Arc::new(InMemoryTopicManager::new());
        let locks = Arc::new(ClusterLockRegistry::new());
        let mastership = Arc::new(
            MastershipController::new(coordinator.clone(), "node-1", "venice-controllers")
                .with_timings(Duration::from_secs(2), Duration::from_millis(5)),
        );

        let engine = Arc::new(StoreLifecycleEngine::new(
            metadata.clone(),
            coordinator.clone(),
            topics,
            mastership.clone(),
            locks.clone(),
            ControllerConfig::default(),
        ));

        Fixture {
            engine,
            metadata,
            coordinator,
            mastership,
            locks,
        }
    }

    async fn lead(fixture: &Fixture, cluster: &str) {
        fixture
            .coordinator
            .ensure_cluster("venice-controllers", ClusterTopology::default())
            .await
            .unwrap();
        fixture
            .coordinator
            .add_resource("venice-controllers", cluster, 1, 1, "LeaderStandby", Rebalancer::default(), 1)
            .await
            .unwrap();
        fixture.coordinator.grant_leader("venice-controllers", cluster, "node-1");
        fixture.mastership.start(cluster).await.unwrap();
    }

    /// A store on cluster A with an ONLINE v1 is migrated to cluster B;
    /// discovery stays on A until B has caught up, then one
    /// migration-monitor tick flips it over.
    #[tokio::test]
    async fn migration_completes_once_destination_catches_up() {
        let fixture = build().await;
        lead(&fixture, "cluster-a").await;
        lead(&fixture, "cluster-b").await;

        fixture
            .engine
            .create_store("cluster-a", "m", "team", "\"long\"", "\"string\"")
            .await
            .unwrap();
        fixture
            .engine
            .increment_version_idempotent("cluster-a", "m", "p-1", Some(1), 1, false, false)
            .await
            .unwrap();
        fixture
            .engine
            .storage_metadata_update("cluster-a", "m", |s| {
                if let Some(v) = s.get_version_mut(1) {
                    v.status = VersionStatus::Online;
                }
                Ok(())
            })
            .await
            .unwrap();
        fixture
            .engine
            .update_store(
                "cluster-a",
                "m",
                UpdateStoreOptions {
                    current_version: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        fixture.engine.migrate_store("cluster-a", "cluster-b", "m").await.unwrap();

        assert_eq!(fixture.metadata.get_store_config("m").await.unwrap().cluster, "cluster-a");

        let monitor = StoreMigrationMonitor::new(fixture.metadata.clone(), fixture.mastership.clone(), fixture.locks.clone());
        monitor.scan_once().await;
        assert_eq!(fixture.metadata.get_store_config("m").await.unwrap().cluster, "cluster-a");

        fixture
            .engine
            .increment_version_idempotent("cluster-b", "m", "p-1-b", Some(1), 1, false, false)
            .await
            .unwrap();
        fixture
            .engine
            .storage_metadata_update("cluster-b", "m", |s| {
                if let Some(v) = s.get_version_mut(1) {
                    v.status = VersionStatus::Online;
                }
                Ok(())
            })
            .await
            .unwrap();

        monitor.scan_once().await;
        assert_eq!(fixture.metadata.get_store_config("m").await.unwrap().cluster, "cluster-b");
    }

    #[tokio::test]
    async fn migrating_to_unled_destination_is_rejected() {
        let fixture = build().await;
        lead(&fixture, "cluster-a").await;

        fixture
            .engine
            .create_store("cluster-a", "m", "team", "\"long\"", "\"string\"")
            .await
            .unwrap();

        let err = fixture
            .engine
            .migrate_store("cluster-a", "cluster-b", "m")
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::NotLeader { .. }));
    }
}
