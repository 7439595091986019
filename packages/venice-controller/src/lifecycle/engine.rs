//! The store lifecycle engine -- the single mutator of
//! store metadata. Every public operation acquires the per-cluster
//! metadata lock plus the target store's lock (see [`crate::locks`])
//! before touching anything, checks mastership, and either completes or
//! leaves behind a state a later call can converge on.
//!
//! Internal `*_inner` methods assume their caller already holds whatever
//! locks the operation needs; they never acquire a lock themselves, so
//! that one operation can call another without deadlocking on a
//! non-reentrant `tokio::sync::RwLock`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{info, warn};
use venice_controller_types::{
    ControllerConfig, ControllerError, Store, StoreConfig, Version, VersionStatus,
    IGNORE_VERSION, NON_EXISTING_VERSION, UNLIMITED_STORAGE_QUOTA,
};

use crate::locks::ClusterLockRegistry;
use crate::mastership::MastershipController;
use crate::metadata_store::MetadataStore;
use crate::resource_coordinator::{Rebalancer, ResourceCoordinator};
use crate::topic_manager::TopicManager;
use crate::ControllerResult;

use super::options::{merge_hybrid_config, HybridConfigUpdate, UpdateStoreOptions};

const MAX_CAS_ATTEMPTS: u32 = 5;
/// Reserved prefix for system-store real-time topics, checked by
/// `check_resource_cleanup_before_store_creation`.
const SYSTEM_STORE_PREFIX: &str = "venice_system_store_";

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

pub struct StoreLifecycleEngine<M: MetadataStore, R: ResourceCoordinator, T: TopicManager> {
    metadata: Arc<M>,
    coordinator: Arc<R>,
    topics: Arc<T>,
    mastership: Arc<MastershipController<R>>,
    locks: Arc<ClusterLockRegistry>,
    config: ControllerConfig,
    offline_push_wait: Duration,
    default_replication_factor: u32,
}

impl<M, R, T> StoreLifecycleEngine<M, R, T>
where
    M: MetadataStore + 'static,
    R: ResourceCoordinator + 'static,
    T: TopicManager + 'static,
{
    #[must_use]
    pub fn new(
        metadata: Arc<M>,
        coordinator: Arc<R>,
        topics: Arc<T>,
        mastership: Arc<MastershipController<R>>,
        locks: Arc<ClusterLockRegistry>,
        config: ControllerConfig,
    ) -> Self {
        let default_replication_factor = config.controller_cluster_replica;
        Self {
            metadata,
            coordinator,
            topics,
            mastership,
            locks,
            config,
            offline_push_wait: Duration::from_secs(60),
            default_replication_factor,
        }
    }

    #[must_use]
    pub fn with_offline_push_wait(mut self, wait: Duration) -> Self {
        self.offline_push_wait = wait;
        self
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<M> {
        &self.metadata
    }

    #[must_use]
    pub fn mastership(&self) -> &Arc<MastershipController<R>> {
        &self.mastership
    }

    #[must_use]
    pub fn topics(&self) -> &Arc<T> {
        &self.topics
    }

    fn require_leader(&self, cluster: &str) -> ControllerResult<()> {
        self.mastership.require_leader(cluster)
    }

    /// Read-mutate-CAS-persist with bounded retry on a lost race. Callers
    /// must already hold the relevant store lock -- this only protects
    /// against stamp drift from concurrent out-of-process writers, which
    /// the in-memory adapter does not have, but the pattern is kept for
    /// the adapters that will.
    pub(crate) async fn storage_metadata_update<F>(&self, cluster: &str, name: &str, mutate: F) -> ControllerResult<Store>
    where
        F: Fn(&mut Store) -> ControllerResult<()>,
    {
        let mut last_err = None;
        for _ in 0..MAX_CAS_ATTEMPTS {
            let stamped = self.metadata.get_store(cluster, name).await?;
            let mut store = stamped.store;
            mutate(&mut store)?;
            match self
                .metadata
                .compare_and_set_store(cluster, name, stamped.stamp, store.clone())
                .await
            {
                Ok(_) => return Ok(store),
                Err(ControllerError::ConcurrentUpdate(msg)) => {
                    last_err = Some(ControllerError::ConcurrentUpdate(msg));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| ControllerError::ConcurrentUpdate(name.to_string())))
    }

    // -----------------------------------------------------------------
    // 4.5.1 createStore
    // -----------------------------------------------------------------

    pub async fn create_store(
        &self,
        cluster: &str,
        name: &str,
        owner: &str,
        key_schema: &str,
        value_schema: &str,
    ) -> ControllerResult<Store> {
        self.require_leader(cluster)?;
        let _meta = self.locks.metadata_write(cluster).await;
        let _store = self.locks.store_write(cluster, name).await;
        self.create_store_inner(cluster, name, owner, key_schema, value_schema).await
    }

    async fn create_store_inner(
        &self,
        cluster: &str,
        name: &str,
        owner: &str,
        key_schema: &str,
        value_schema: &str,
    ) -> ControllerResult<Store> {
        if let Ok(cfg) = self.metadata.get_store_config(name).await {
            if !cfg.deleting {
                return Err(ControllerError::AlreadyExists(format!("store '{name}'")));
            }
        }

        if self.metadata.get_store(cluster, name).await.is_ok() {
            self.storage_metadata_update(cluster, name, |s| {
                s.enable_reads = false;
                s.enable_writes = false;
                Ok(())
            })
            .await?;
            self.delete_store_inner(cluster, name, IGNORE_VERSION).await?;
        }

        let largest_used = self.metadata.get_largest_used_version_from_graveyard(name).await?;
        let store = Store::new(name.to_string(), owner.to_string(), now_millis(), largest_used);
        self.metadata.add_store(cluster, store.clone()).await?;
        self.metadata
            .put_store_config(StoreConfig::new(name.to_string(), cluster.to_string()))
            .await?;
        self.metadata.add_key_schema(name, key_schema).await?;
        self.metadata.add_value_schema(name, value_schema).await?;

        info!(cluster, store = name, "created store");
        Ok(store)
    }

    // -----------------------------------------------------------------
    // 4.5.2 addVersion / 4.5.3 incrementVersionIdempotent
    // -----------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn add_version(
        &self,
        cluster: &str,
        store_name: &str,
        push_job_id: &str,
        number_hint: Option<u32>,
        partition_count_hint: Option<u32>,
        replication_factor: u32,
        start_monitor: bool,
        send_sop: bool,
    ) -> ControllerResult<Version> {
        self.require_leader(cluster)?;
        let _meta = self.locks.metadata_write(cluster).await;
        self.add_version_inner(
            cluster,
            store_name,
            push_job_id,
            number_hint,
            partition_count_hint,
            replication_factor,
            start_monitor,
            send_sop,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn increment_version_idempotent(
        &self,
        cluster: &str,
        store_name: &str,
        push_job_id: &str,
        partition_count_hint: Option<u32>,
        replication_factor: u32,
        start_monitor: bool,
        send_sop: bool,
    ) -> ControllerResult<Version> {
        self.require_leader(cluster)?;
        let _meta = self.locks.metadata_write(cluster).await;

        let stamped = self.metadata.get_store(cluster, store_name).await?;
        if let Some(existing) = stamped.store.find_by_push_job_id(push_job_id) {
            return Ok(existing.clone());
        }

        self.add_version_inner(
            cluster,
            store_name,
            push_job_id,
            None,
            partition_count_hint,
            replication_factor,
            start_monitor,
            send_sop,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn add_version_inner(
        &self,
        cluster: &str,
        store_name: &str,
        push_job_id: &str,
        number_hint: Option<u32>,
        partition_count_hint: Option<u32>,
        replication_factor: u32,
        start_monitor: bool,
        send_sop: bool,
    ) -> ControllerResult<Version> {
        let version = {
            let _store_guard = self.locks.store_write(cluster, store_name).await;

            let stamped = self.metadata.get_store(cluster, store_name).await?;
            if let Some(hint) = number_hint {
                if stamped.store.get_version(i32::try_from(hint).unwrap_or(i32::MAX)).is_some() {
                    return Err(ControllerError::Conflict(format!(
                        "version {hint} already exists for store '{store_name}'"
                    )));
                }
            }

            let number = number_hint.unwrap_or_else(|| {
                let max = stamped.store.max_version_number();
                if max < 0 {
                    1
                } else {
                    u32::try_from(max).unwrap_or(u32::MAX) + 1
                }
            });

            let partition_count = if stamped.store.partition_count > 0 {
                stamped.store.partition_count
            } else {
                partition_count_hint.unwrap_or(venice_controller_types::DEFAULT_PARTITION_COUNT)
            };

            let version = Version {
                store_name: store_name.to_string(),
                number,
                push_job_id: push_job_id.to_string(),
                status: VersionStatus::Started,
                partition_count,
                replication_factor,
            };

            self.storage_metadata_update(cluster, store_name, |s| {
                s.versions.push(version.clone());
                if s.partition_count == 0 {
                    s.partition_count = partition_count;
                }
                s.largest_used_version_number =
                    s.largest_used_version_number.max(i32::try_from(number).unwrap_or(i32::MAX));
                Ok(())
            })
            .await?;

            version
        };

        let resource_name = version.resource_name();

        if let Err(e) = self
            .topics
            .create_topic(
                &resource_name,
                version.partition_count,
                replication_factor,
                u64::MAX,
            )
            .await
        {
            return self.handle_version_creation_failure(cluster, store_name, version.number, e).await;
        }

        if send_sop {
            self.coordinator
                .send_message_to_participants(cluster, &resource_name, "START_OF_PUSH", 3)
                .await;
        }

        if start_monitor {
            let topology = match self.coordinator.get_cluster_topology(cluster).await {
                Ok(t) => t,
                Err(e) => return self.handle_version_creation_failure(cluster, store_name, version.number, e).await,
            };
            let rebalancer = Rebalancer {
                delayed_rebalance_ms: topology.delayed_rebalance_ms,
            };

            if let Err(e) = self
                .coordinator
                .add_resource(
                    cluster,
                    &resource_name,
                    version.partition_count,
                    replication_factor,
                    "OnlineOffline",
                    rebalancer,
                    topology.min_active_replicas,
                )
                .await
            {
                return self.handle_version_creation_failure(cluster, store_name, version.number, e).await;
            }

            if let Err(e) = self
                .coordinator
                .wait_for_assignment(cluster, &resource_name, replication_factor, self.offline_push_wait)
                .await
            {
                return self.handle_version_creation_failure(cluster, store_name, version.number, e).await;
            }
        }

        Ok(version)
    }

    async fn handle_version_creation_failure(
        &self,
        cluster: &str,
        store_name: &str,
        number: u32,
        cause: ControllerError,
    ) -> ControllerResult<Version> {
        warn!(cluster, store_name, number, error = %cause, "version creation failed, rolling back");

        let _store_guard = self.locks.store_write(cluster, store_name).await;
        let _ = self
            .storage_metadata_update(cluster, store_name, |s| {
                if let Some(v) = s.get_version_mut(i32::try_from(number).unwrap_or(i32::MAX)) {
                    v.status = VersionStatus::Error;
                }
                Ok(())
            })
            .await;
        let _ = self.delete_one_store_version_inner(cluster, store_name, number).await;

        Err(ControllerError::Fatal(format!(
            "version creation failed for store '{store_name}' v{number}: {cause}"
        )))
    }

    // -----------------------------------------------------------------
    // 4.5.4 getStartedVersion
    // -----------------------------------------------------------------

    pub async fn get_started_version(&self, cluster: &str, store_name: &str) -> ControllerResult<Option<Version>> {
        let _meta = self.locks.metadata_read(cluster).await;
        let _store = self.locks.store_read(cluster, store_name).await;

        let stamped = self.metadata.get_store(cluster, store_name).await?;
        let started = stamped.store.started_versions_above_current();
        if started.len() > 1 {
            return Err(ControllerError::Conflict(format!(
                "store '{store_name}' has multiple STARTED versions above current"
            )));
        }

        let error_above_current = stamped.store.versions.iter().any(|v| {
            v.status == VersionStatus::Error && i64::from(v.number) > i64::from(stamped.store.current_version)
        });
        if error_above_current {
            return Err(ControllerError::Conflict(format!(
                "store '{store_name}' has an ERROR version above current"
            )));
        }

        Ok(started.into_iter().next().cloned())
    }

    // -----------------------------------------------------------------
    // 4.5.5 deleteOneStoreVersion
    // -----------------------------------------------------------------

    pub async fn delete_one_store_version(&self, cluster: &str, store_name: &str, number: u32) -> ControllerResult<()> {
        self.require_leader(cluster)?;
        let _meta = self.locks.metadata_write(cluster).await;
        let _store = self.locks.store_write(cluster, store_name).await;
        self.delete_one_store_version_inner(cluster, store_name, number).await
    }

    async fn delete_one_store_version_inner(&self, cluster: &str, store_name: &str, number: u32) -> ControllerResult<()> {
        let resource_name = format!("{store_name}_v{number}");

        self.coordinator.drop_resource(cluster, &resource_name).await?;
        self.coordinator
            .send_message_to_participants(cluster, &resource_name, "KILL", 3)
            .await;

        let stamped = self.metadata.get_store(cluster, store_name).await?;
        let is_hybrid = stamped.store.is_hybrid();
        let is_migrating = stamped.store.migrating;

        if is_hybrid && !is_migrating {
            info!(cluster, store_name, number, "stopping real-time buffer replay into retiring version");
        }

        self.storage_metadata_update(cluster, store_name, |s| {
            s.versions.retain(|v| v.number != number);
            Ok(())
        })
        .await?;

        if !is_migrating {
            self.topics
                .update_retention(&resource_name, self.config.deprecated_job_topic_retention_ms)
                .await?;
        }

        Ok(())
    }

    // -----------------------------------------------------------------
    // 4.5.6 retireOldStoreVersions
    // -----------------------------------------------------------------

    pub async fn retire_old_store_versions(&self, cluster: &str, store_name: &str) -> ControllerResult<()> {
        self.require_leader(cluster)?;
        let _meta = self.locks.metadata_write(cluster).await;
        let _store = self.locks.store_write(cluster, store_name).await;

        let stamped = self.metadata.get_store(cluster, store_name).await?;
        let min_preserve = self.config.min_number_of_store_versions_to_preserve as usize;
        let to_delete = stamped.store.retrieve_versions_to_delete(min_preserve);

        for version in &to_delete {
            self.delete_one_store_version_inner(cluster, store_name, version.number).await?;
        }

        let stamped_after = self.metadata.get_store(cluster, store_name).await?;
        let current_numbers: HashSet<u32> = stamped_after.store.versions.iter().map(|v| v.number).collect();
        let prefix = format!("{store_name}_v");

        let topics = self.topics.list_topics().await?;
        for topic in topics {
            let Some(rest) = topic.name.strip_prefix(&prefix) else { continue };
            let Ok(number) = rest.parse::<u32>() else { continue };
            if current_numbers.contains(&number) {
                continue;
            }
            let already_truncated = self
                .topics
                .is_retention_below_threshold(&topic.name, self.config.deprecated_job_topic_max_retention_ms)
                .await?;
            if !already_truncated {
                self.topics
                    .update_retention(&topic.name, self.config.deprecated_job_topic_retention_ms)
                    .await?;
            }
        }

        Ok(())
    }

    // -----------------------------------------------------------------
    // 4.5.7 deleteStore
    // -----------------------------------------------------------------

    pub async fn delete_store(
        &self,
        cluster: &str,
        store_name: &str,
        largest_used_version_override: i32,
    ) -> ControllerResult<()> {
        self.require_leader(cluster)?;
        let _meta = self.locks.metadata_write(cluster).await;
        let _store = self.locks.store_write(cluster, store_name).await;
        self.delete_store_inner(cluster, store_name, largest_used_version_override).await
    }

    async fn delete_store_inner(
        &self,
        cluster: &str,
        store_name: &str,
        largest_used_version_override: i32,
    ) -> ControllerResult<()> {
        let stamped = self.metadata.get_store(cluster, store_name).await?;
        let store = stamped.store;

        if store.enable_reads || store.enable_writes {
            return Err(ControllerError::Conflict(format!(
                "store '{store_name}' must disable reads and writes before deletion"
            )));
        }

        if largest_used_version_override != IGNORE_VERSION
            && largest_used_version_override < store.largest_used_version_number
        {
            return Err(ControllerError::Fatal(format!(
                "refusing to regress largestUsedVersionNumber for store '{store_name}': {largest_used_version_override} < {}",
                store.largest_used_version_number
            )));
        }

        let mut clear_config = false;
        if let Ok(cfg) = self.metadata.get_store_config(store_name).await {
            if cfg.cluster == cluster {
                let mut updated = cfg;
                updated.deleting = true;
                self.metadata.put_store_config(updated).await?;
                clear_config = true;
            }
        }

        let version_numbers: Vec<u32> = store.versions.iter().map(|v| v.number).collect();
        for number in version_numbers {
            self.delete_one_store_version_inner(cluster, store_name, number).await?;
        }

        if store.is_hybrid() {
            self.topics
                .update_retention(&store.real_time_topic_name(), self.config.deprecated_job_topic_retention_ms)
                .await?;
        }

        let prefix = format!("{store_name}_v");
        let topics = self.topics.list_topics().await?;
        for topic in topics {
            if topic.name.starts_with(&prefix) {
                self.topics
                    .update_retention(&topic.name, self.config.deprecated_job_topic_retention_ms)
                    .await?;
            }
        }

        let largest_used_final = if largest_used_version_override == IGNORE_VERSION {
            store.largest_used_version_number
        } else {
            largest_used_version_override
        };
        self.metadata.put_graveyard(store_name, largest_used_final).await?;
        self.metadata.delete_store(cluster, store_name).await?;
        if clear_config {
            self.metadata.delete_store_config(store_name).await?;
        }

        info!(cluster, store_name, "deleted store");
        Ok(())
    }

    // -----------------------------------------------------------------
    // 4.5.8 migrateStore
    // -----------------------------------------------------------------

    pub async fn migrate_store(&self, src_cluster: &str, dest_cluster: &str, store_name: &str) -> ControllerResult<()> {
        self.require_leader(src_cluster)?;
        self.require_leader(dest_cluster)?;

        // Lock ordering is always lexicographic across the two clusters so
        // a concurrent migrate in the opposite direction cannot deadlock.
        let (first, second) = if src_cluster <= dest_cluster {
            (src_cluster, dest_cluster)
        } else {
            (dest_cluster, src_cluster)
        };

        let mut meta_guards = vec![self.locks.metadata_write(first).await];
        let mut store_guards = vec![self.locks.store_write(first, store_name).await];
        if first != second {
            meta_guards.push(self.locks.metadata_write(second).await);
            store_guards.push(self.locks.store_write(second, store_name).await);
        }

        let src_stamped = self.metadata.get_store(src_cluster, store_name).await?;
        let src_store = src_stamped.store;

        if self.metadata.get_store(dest_cluster, store_name).await.is_err() {
            if let Some(key_schema) = self.metadata.get_key_schema(store_name).await? {
                self.metadata.add_key_schema(store_name, &key_schema).await?;
            }
            for entry in self.metadata.get_value_schemas(store_name).await? {
                self.metadata.add_value_schema(store_name, &entry.schema).await?;
            }

            let dest_largest_used = self.metadata.get_largest_used_version_from_graveyard(store_name).await?;
            let mut dest_store = Store::new(
                store_name.to_string(),
                src_store.owner.clone(),
                now_millis(),
                dest_largest_used,
            );
            dest_store.partition_count = src_store.partition_count;
            dest_store.storage_quota_bytes = src_store.storage_quota_bytes;
            dest_store.read_quota_cu = src_store.read_quota_cu;
            dest_store.access_controlled = src_store.access_controlled;
            dest_store.compression_strategy = src_store.compression_strategy;
            dest_store.chunking_enabled = src_store.chunking_enabled;
            dest_store.batch_get_limit = src_store.batch_get_limit;
            dest_store.num_versions_to_preserve = src_store.num_versions_to_preserve;
            dest_store.hybrid_config = src_store.hybrid_config;
            dest_store.incremental_push_enabled = src_store.incremental_push_enabled;
            dest_store.router_cache_single_get_enabled = src_store.router_cache_single_get_enabled;
            dest_store.router_cache_batch_get_enabled = src_store.router_cache_batch_get_enabled;

            self.metadata.add_store(dest_cluster, dest_store).await?;
        }

        let mut cfg = self.metadata.get_store_config(store_name).await?;
        cfg.migration_src = Some(src_cluster.to_string());
        cfg.migration_dest = Some(dest_cluster.to_string());
        self.metadata.put_store_config(cfg).await?;

        self.storage_metadata_update(src_cluster, store_name, |s| {
            s.migrating = true;
            Ok(())
        })
        .await?;
        self.storage_metadata_update(dest_cluster, store_name, |s| {
            s.migrating = true;
            s.largest_used_version_number = 0;
            Ok(())
        })
        .await?;

        info!(src_cluster, dest_cluster, store_name, "started store migration");
        Ok(())
    }

    // -----------------------------------------------------------------
    // 4.5.9 updateStore
    // -----------------------------------------------------------------

    pub async fn update_store(&self, cluster: &str, store_name: &str, opts: UpdateStoreOptions) -> ControllerResult<Store> {
        self.require_leader(cluster)?;
        let _meta = self.locks.metadata_write(cluster).await;
        let _store = self.locks.store_write(cluster, store_name).await;
        self.update_store_inner(cluster, store_name, &opts).await
    }

    async fn update_store_inner(&self, cluster: &str, store_name: &str, opts: &UpdateStoreOptions) -> ControllerResult<Store> {
        let stamped = self.metadata.get_store(cluster, store_name).await?;
        let updated = self.apply_update_options(&stamped.store, opts)?;

        self.metadata
            .compare_and_set_store(cluster, store_name, stamped.stamp, updated.clone())
            .await?;
        Ok(updated)
    }

    /// Builds a new `Store` from `store` with every present option applied
    /// in a fixed order. Returns an error
    /// without mutating `store` itself if any option is rejected -- the
    /// caller's pre-image is therefore never touched on failure.
    fn apply_update_options(&self, store: &Store, opts: &UpdateStoreOptions) -> ControllerResult<Store> {
        let mut s = store.clone();

        if let Some(owner) = &opts.owner {
            s.owner = owner.clone();
        }
        if let Some(v) = opts.enable_reads {
            s.enable_reads = v;
        }
        if let Some(v) = opts.enable_writes {
            s.enable_writes = v;
        }

        if let Some(partition_count) = opts.partition_count {
            if s.is_hybrid() && s.partition_count != 0 && s.partition_count != partition_count {
                return Err(ControllerError::Conflict(format!(
                    "cannot change partition count on hybrid store '{store_name}'",
                    store_name = s.store_name
                )));
            }
            s.partition_count = partition_count.clamp(
                self.config.min_number_of_partitions,
                self.config.max_number_of_partitions,
            );
        }

        if let Some(v) = opts.storage_quota_bytes {
            if v < 0 && v != UNLIMITED_STORAGE_QUOTA {
                return Err(ControllerError::Conflict(format!(
                    "storageQuotaBytes must be >=0 or UNLIMITED for store '{}'",
                    s.store_name
                )));
            }
            s.storage_quota_bytes = v;
        }

        if let Some(v) = opts.read_quota_cu {
            s.read_quota_cu = v;
        }

        if let Some(v) = opts.current_version {
            if s.get_version(v).is_none() {
                return Err(ControllerError::NotFound(format!(
                    "version {v} does not exist for store '{}'",
                    s.store_name
                )));
            }
            let first_ever = s.current_version == NON_EXISTING_VERSION;
            if !s.enable_writes && !first_ever {
                return Err(ControllerError::Conflict(format!("store '{}' is not writable", s.store_name)));
            }
            s.current_version = v;
        }

        if let Some(v) = opts.largest_used_version_number {
            if v < s.largest_used_version_number {
                return Err(ControllerError::Fatal(format!(
                    "refusing to regress largestUsedVersionNumber for store '{}'",
                    s.store_name
                )));
            }
            s.largest_used_version_number = v;
        }

        if let Some(hybrid_update) = &opts.hybrid_config {
            let merged = merge_hybrid_config(s.hybrid_config, hybrid_update)
                .map_err(ControllerError::Conflict)?;
            if merged.is_some()
                && (s.incremental_push_enabled || s.router_cache_single_get_enabled || s.router_cache_batch_get_enabled)
            {
                return Err(ControllerError::Conflict(format!(
                    "store '{}' cannot be hybrid while incremental push or router cache is enabled",
                    s.store_name
                )));
            }
            s.hybrid_config = merged;
        }

        if let Some(v) = opts.access_controlled {
            s.access_controlled = v;
        }
        if let Some(v) = opts.compression_strategy {
            s.compression_strategy = v;
        }
        if let Some(v) = opts.chunking_enabled {
            s.chunking_enabled = v;
        }

        if let Some(v) = opts.router_cache_single_get_enabled {
            if v && (s.is_hybrid() || s.incremental_push_enabled) {
                return Err(ControllerError::Conflict(format!(
                    "router cache forbidden on hybrid/incremental-push store '{}'",
                    s.store_name
                )));
            }
            s.router_cache_single_get_enabled = v;
        }
        if let Some(v) = opts.router_cache_batch_get_enabled {
            if v && (s.is_hybrid() || s.incremental_push_enabled) {
                return Err(ControllerError::Conflict(format!(
                    "router cache forbidden on hybrid/incremental-push store '{}'",
                    s.store_name
                )));
            }
            s.router_cache_batch_get_enabled = v;
        }

        if let Some(v) = opts.batch_get_limit {
            s.batch_get_limit = v;
        }
        if let Some(v) = opts.num_versions_to_preserve {
            s.num_versions_to_preserve = v;
        }

        if let Some(v) = opts.incremental_push_enabled {
            if v && s.is_hybrid() {
                return Err(ControllerError::Conflict(format!(
                    "incrementalPushEnabled forbidden on hybrid store '{}'",
                    s.store_name
                )));
            }
            s.incremental_push_enabled = v;
        }

        if let Some(v) = opts.migrating {
            s.migrating = v;
        }

        Ok(s)
    }

    // -----------------------------------------------------------------
    // 4.5.10 realTimeTopicEnsurance
    // -----------------------------------------------------------------

    pub async fn real_time_topic_ensurance(&self, cluster: &str, store_name: &str) -> ControllerResult<()> {
        self.require_leader(cluster)?;
        let _meta = self.locks.metadata_read(cluster).await;
        let _store = self.locks.store_read(cluster, store_name).await;

        let stamped = self.metadata.get_store(cluster, store_name).await?;
        if !stamped.store.is_hybrid() {
            return Err(ControllerError::Conflict(format!("store '{store_name}' is not hybrid")));
        }
        if stamped.store.partition_count == 0 {
            return Err(ControllerError::Conflict(format!(
                "store '{store_name}' has no partitions configured yet"
            )));
        }

        let rt_topic = stamped.store.real_time_topic_name();
        if self.topics.contains_topic(&rt_topic).await? {
            return Ok(());
        }
        self.topics
            .create_topic(&rt_topic, stamped.store.partition_count, self.default_replication_factor, u64::MAX)
            .await
    }

    // -----------------------------------------------------------------
    // 4.5.11 checkResourceCleanupBeforeStoreCreation
    // -----------------------------------------------------------------

    pub async fn check_resource_cleanup_before_store_creation(
        &self,
        cluster: &str,
        store_name: &str,
        include_helix: bool,
    ) -> ControllerResult<()> {
        if let Ok(cfg) = self.metadata.get_store_config(store_name).await {
            if !cfg.deleting {
                return Err(ControllerError::Conflict(format!(
                    "store config still present for '{store_name}'"
                )));
            }
        }

        if self.metadata.get_store(cluster, store_name).await.is_ok() {
            return Err(ControllerError::Conflict(format!("live store still present for '{store_name}'")));
        }

        // Version topics are deliberately ignored here -- they may lag a
        // deletion briefly and recreating the store is still safe.
        let rt_topic = format!("{store_name}_rt");
        if self.topics.contains_topic(&rt_topic).await? {
            return Err(ControllerError::Conflict(format!("real-time topic '{rt_topic}' still present")));
        }
        let system_rt_topic = format!("{SYSTEM_STORE_PREFIX}{store_name}_rt");
        if self.topics.contains_topic(&system_rt_topic).await? {
            return Err(ControllerError::Conflict(format!(
                "system-store real-time topic '{system_rt_topic}' still present"
            )));
        }

        if include_helix {
            let prefix = format!("{store_name}_v");
            let resources = self.coordinator.list_resources(cluster).await?;
            if resources.iter().any(|r| r.starts_with(&prefix)) {
                return Err(ControllerError::Conflict(format!(
                    "coordinator still has resources for '{store_name}'"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource_coordinator::{ClusterTopology, InMemoryResourceCoordinator};
    use crate::metadata_store::InMemoryMetadataStore;
    use crate::topic_manager::InMemoryTopicManager;

    type TestEngine = StoreLifecycleEngine<InMemoryMetadataStore, InMemoryResourceCoordinator, InMemoryTopicManager>;

    async fn harness(cluster: &str) -> (Arc<TestEngine>, Arc<InMemoryResourceCoordinator>) {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let coordinator = Arc::new(InMemoryResourceCoordinator::new());
        let topics = Arc::new(InMemoryTopicManager::new());
        let locks = Arc::new(ClusterLockRegistry::new());
        let mastership = Arc::new(
            MastershipController::new(coordinator.clone(), "node-1", "venice-controllers")
                .with_timings(Duration::from_secs(2), Duration::from_millis(5)),
        );

        coordinator
            .ensure_cluster("venice-controllers", ClusterTopology::default())
            .await
            .unwrap();
        coordinator
            .add_resource("venice-controllers", cluster, 1, 1, "LeaderStandby", Rebalancer::default(), 1)
            .await
            .unwrap();
        coordinator.grant_leader("venice-controllers", cluster, "node-1");
        mastership.start(cluster).await.unwrap();

        let engine = Arc::new(StoreLifecycleEngine::new(
            metadata,
            coordinator.clone(),
            topics,
            mastership,
            locks,
            ControllerConfig::default(),
        ));
        (engine, coordinator)
    }

    /// A push is idempotent on push job id: retrying the same job
    /// after the version already went online returns the same version.
    #[tokio::test]
    async fn happy_push_idempotent_on_push_job_id() {
        let (engine, _coordinator) = harness("cluster-a").await;

        engine
            .create_store("cluster-a", "orders", "team", "\"long\"", "\"string\"")
            .await
            .unwrap();

        let v1 = engine
            .increment_version_idempotent("cluster-a", "orders", "p-1", Some(4), 3, false, false)
            .await
            .unwrap();
        assert_eq!(v1.number, 1);
        assert_eq!(v1.status, VersionStatus::Started);

        // Simulate the push monitor driving the version to ONLINE and
        // flipping current_version, the way an external push-status
        // consumer would.
        engine
            .storage_metadata_update("cluster-a", "orders", |s| {
                if let Some(v) = s.get_version_mut(1) {
                    v.status = VersionStatus::Online;
                }
                Ok(())
            })
            .await
            .unwrap();
        engine
            .update_store(
                "cluster-a",
                "orders",
                UpdateStoreOptions {
                    current_version: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let v1_again = engine
            .increment_version_idempotent("cluster-a", "orders", "p-1", Some(4), 3, false, false)
            .await
            .unwrap();
        assert_eq!(v1_again.number, 1);
    }

    /// Deleting a store is refused while it's still readable or
    /// writable, and succeeds once both are disabled.
    #[tokio::test]
    async fn delete_store_refuses_while_readable_or_writable() {
        let (engine, _coordinator) = harness("cluster-a").await;
        engine
            .create_store("cluster-a", "orders", "team", "\"long\"", "\"string\"")
            .await
            .unwrap();

        let err = engine.delete_store("cluster-a", "orders", IGNORE_VERSION).await.unwrap_err();
        assert!(matches!(err, ControllerError::Conflict(_)));

        engine
            .update_store(
                "cluster-a",
                "orders",
                UpdateStoreOptions {
                    enable_reads: Some(false),
                    enable_writes: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        engine.delete_store("cluster-a", "orders", IGNORE_VERSION).await.unwrap();
        assert_eq!(
            engine
                .metadata()
                .get_largest_used_version_from_graveyard("orders")
                .await
                .unwrap(),
            0
        );
    }

    /// Once a store goes hybrid, partition count and incremental push
    /// become immutable.
    #[tokio::test]
    async fn hybrid_store_rejects_partition_count_and_incremental_push_changes() {
        let (engine, _coordinator) = harness("cluster-a").await;
        engine
            .create_store("cluster-a", "orders", "team", "\"long\"", "\"string\"")
            .await
            .unwrap();

        engine
            .update_store(
                "cluster-a",
                "orders",
                UpdateStoreOptions {
                    partition_count: Some(4),
                    hybrid_config: Some(HybridConfigUpdate {
                        rewind_seconds: Some(86400),
                        offset_lag_threshold: Some(1000),
                    }),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = engine
            .update_store(
                "cluster-a",
                "orders",
                UpdateStoreOptions {
                    partition_count: Some(16),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Conflict(_)));

        let err = engine
            .update_store(
                "cluster-a",
                "orders",
                UpdateStoreOptions {
                    incremental_push_enabled: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Conflict(_)));

        let store = engine.metadata().get_store("cluster-a", "orders").await.unwrap().store;
        assert_eq!(store.partition_count, 4);
        assert!(!store.incremental_push_enabled);
    }

    /// Leftover version topics don't block recreating a deleted store,
    /// but a leftover real-time topic does.
    #[tokio::test]
    async fn cleanup_before_recreate_ignores_version_topics_but_not_rt_topic() {
        let (engine, _coordinator) = harness("cluster-a").await;

        engine
            .check_resource_cleanup_before_store_creation("cluster-a", "ghost", false)
            .await
            .unwrap();

        engine
            .topics()
            .create_topic("ghost_v1", 1, 1, u64::MAX)
            .await
            .unwrap();
        engine
            .check_resource_cleanup_before_store_creation("cluster-a", "ghost", false)
            .await
            .unwrap();

        engine.topics().create_topic("ghost_rt", 1, 1, u64::MAX).await.unwrap();
        let err = engine
            .check_resource_cleanup_before_store_creation("cluster-a", "ghost", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Conflict(_)));
    }

    #[tokio::test]
    async fn create_store_twice_fails_already_exists() {
        let (engine, _coordinator) = harness("cluster-a").await;
        engine
            .create_store("cluster-a", "orders", "team", "\"long\"", "\"string\"")
            .await
            .unwrap();
        let err = engine
            .create_store("cluster-a", "orders", "team", "\"long\"", "\"string\"")
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn non_leader_operations_are_rejected() {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let coordinator = Arc::new(InMemoryResourceCoordinator::new());
        let topics = Arc::new(InMemoryTopicManager::new());
        let locks = Arc::new(ClusterLockRegistry::new());
        let mastership = Arc::new(MastershipController::new(
            coordinator.clone(),
            "node-1",
            "venice-controllers",
        ));
        let engine = StoreLifecycleEngine::new(metadata, coordinator, topics, mastership, locks, ControllerConfig::default());

        let err = engine
            .create_store("cluster-a", "orders", "team", "\"long\"", "\"string\"")
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::NotLeader { .. }));
    }
}
