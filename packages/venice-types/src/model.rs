//! Store / Version / discovery / graveyard / schema domain model.
//!
//! These are plain value types, handed out as owned clones everywhere (no
//! in-memory aliasing back to the metadata store's copy). Mutation always
//! goes through the lifecycle engine's read-modify-CAS-persist path, never
//! through a mutable reference retained by a caller.

use serde::{Deserialize, Serialize};

/// Sentinel for "this store has no current version yet".
pub const NON_EXISTING_VERSION: i32 = -1;

/// Sentinel passed to `delete_store` meaning "don't check the graveyard
/// regression invariant, just delete".
pub const IGNORE_VERSION: i32 = i32::MIN;

/// The id assigned to every store's key schema. Key schemas are not
/// versioned the way value schemas are -- a store has exactly one.
pub const KEY_SCHEMA_ID: u32 = 1;

/// Number of partitions used by the meta-cluster's leader/standby resource,
/// and the default backup topic/version partition count when a store does
/// not otherwise specify one.
pub const DEFAULT_PARTITION_COUNT: u32 = 1;

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// Lifecycle status of a single store `Version`.
///
/// Transitions: `NotCreated -> Started` at creation; `Started -> Pushed ->
/// Online` on successful push, or `Started -> Error` on failure. `Online`
/// and `Error` are terminal for the version object itself -- removing a
/// version from its store is a distinct operation (`delete_one_store_version`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VersionStatus {
    NotCreated,
    Started,
    Pushed,
    Online,
    Error,
}

impl VersionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, VersionStatus::Online | VersionStatus::Error)
    }
}

/// One immutable snapshot/push of a store's contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub store_name: String,
    pub number: u32,
    pub push_job_id: String,
    pub status: VersionStatus,
    pub partition_count: u32,
    pub replication_factor: u32,
}

impl Version {
    #[must_use]
    pub fn resource_name(&self) -> String {
        format!("{}_v{}", self.store_name, self.number)
    }
}

// ---------------------------------------------------------------------------
// Hybrid config
// ---------------------------------------------------------------------------

/// Real-time ingestion configuration for hybrid stores.
///
/// A store is hybrid iff it carries a `HybridStoreConfig`. Hybrid stores
/// forbid `incremental_push_enabled` and both router-cache flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HybridStoreConfig {
    pub rewind_seconds: i64,
    pub offset_lag_threshold: i64,
}

// ---------------------------------------------------------------------------
// CompressionStrategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CompressionStrategy {
    #[default]
    NoOp,
    Gzip,
    Zstd,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// A named, versioned keyspace. Owned exclusively by the metadata store
/// under the per-cluster/per-store locks (see `locks`); every copy handed
/// out to a caller is a defensive clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub store_name: String,
    pub owner: String,
    pub created_at_ms: i64,
    pub partition_count: u32,
    pub current_version: i32,
    pub largest_used_version_number: i32,
    pub enable_reads: bool,
    pub enable_writes: bool,
    pub migrating: bool,
    pub hybrid_config: Option<HybridStoreConfig>,
    pub incremental_push_enabled: bool,
    pub router_cache_single_get_enabled: bool,
    pub router_cache_batch_get_enabled: bool,
    pub storage_quota_bytes: i64,
    pub read_quota_cu: u64,
    pub access_controlled: bool,
    pub compression_strategy: CompressionStrategy,
    pub chunking_enabled: bool,
    pub batch_get_limit: i32,
    pub num_versions_to_preserve: u32,
    pub versions: Vec<Version>,
}

/// Storage quota sentinel meaning "no quota enforced".
pub const UNLIMITED_STORAGE_QUOTA: i64 = -1;

impl Store {
    /// Builds a freshly created store with the defaults `create_store`
    /// assigns, recovering `largest_used_version_number` from the graveyard.
    #[must_use]
    pub fn new(
        store_name: String,
        owner: String,
        created_at_ms: i64,
        largest_used_version_number: i32,
    ) -> Self {
        Self {
            store_name,
            owner,
            created_at_ms,
            partition_count: 0,
            current_version: NON_EXISTING_VERSION,
            largest_used_version_number,
            enable_reads: true,
            enable_writes: true,
            migrating: false,
            hybrid_config: None,
            incremental_push_enabled: false,
            router_cache_single_get_enabled: false,
            router_cache_batch_get_enabled: false,
            storage_quota_bytes: UNLIMITED_STORAGE_QUOTA,
            read_quota_cu: 0,
            access_controlled: false,
            compression_strategy: CompressionStrategy::NoOp,
            chunking_enabled: false,
            batch_get_limit: -1,
            num_versions_to_preserve: 2,
            versions: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_hybrid(&self) -> bool {
        self.hybrid_config.is_some()
    }

    #[must_use]
    pub fn real_time_topic_name(&self) -> String {
        format!("{}_rt", self.store_name)
    }

    #[must_use]
    pub fn get_version(&self, number: i32) -> Option<&Version> {
        self.versions.iter().find(|v| i64::from(v.number) == i64::from(number))
    }

    #[must_use]
    pub fn get_version_mut(&mut self, number: i32) -> Option<&mut Version> {
        self.versions.iter_mut().find(|v| i64::from(v.number) == i64::from(number))
    }

    #[must_use]
    pub fn find_by_push_job_id(&self, push_job_id: &str) -> Option<&Version> {
        self.versions.iter().find(|v| v.push_job_id == push_job_id)
    }

    #[must_use]
    pub fn max_version_number(&self) -> i32 {
        self.versions
            .iter()
            .map(|v| i32::try_from(v.number).unwrap_or(i32::MAX))
            .max()
            .unwrap_or(NON_EXISTING_VERSION)
    }

    /// All `Started` versions with `number > current_version`. The
    /// idempotent-push invariant requires at most one.
    #[must_use]
    pub fn started_versions_above_current(&self) -> Vec<&Version> {
        self.versions
            .iter()
            .filter(|v| {
                v.status == VersionStatus::Started
                    && i64::from(v.number) > i64::from(self.current_version)
            })
            .collect()
    }

    /// Versions to delete per `retire_old_store_versions`:
    /// keep `current_version`, the `min_to_preserve` most recent `Online`
    /// versions, and any `Started` version.
    #[must_use]
    pub fn retrieve_versions_to_delete(&self, min_to_preserve: usize) -> Vec<Version> {
        let mut online: Vec<&Version> = self
            .versions
            .iter()
            .filter(|v| v.status == VersionStatus::Online)
            .collect();
        online.sort_by(|a, b| b.number.cmp(&a.number));
        let keep_online: std::collections::HashSet<u32> =
            online.iter().take(min_to_preserve).map(|v| v.number).collect();

        self.versions
            .iter()
            .filter(|v| {
                i64::from(v.number) != i64::from(self.current_version)
                    && v.status != VersionStatus::Started
                    && !keep_online.contains(&v.number)
            })
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// StoreConfig (discovery)
// ---------------------------------------------------------------------------

/// `storeName -> (cluster, deleting?, migrationSrc?, migrationDest?)`. One
/// row per existing store name; consulted by clients to locate the
/// authoritative controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    pub store_name: String,
    pub cluster: String,
    pub deleting: bool,
    pub migration_src: Option<String>,
    pub migration_dest: Option<String>,
}

impl StoreConfig {
    #[must_use]
    pub fn new(store_name: String, cluster: String) -> Self {
        Self {
            store_name,
            cluster,
            deleting: false,
            migration_src: None,
            migration_dest: None,
        }
    }

    #[must_use]
    pub fn is_migrating(&self) -> bool {
        self.migration_src.is_some() && self.migration_dest.is_some()
    }
}

// ---------------------------------------------------------------------------
// Graveyard
// ---------------------------------------------------------------------------

/// Durable record of a deleted store, retaining the largest-used version
/// number so a recreated store cannot regress it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraveyardEntry {
    pub largest_used_version_number: i32,
}

// ---------------------------------------------------------------------------
// Schema registry entries
// ---------------------------------------------------------------------------

/// One registered value schema for a store, with its monotonic id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub id: u32,
    pub schema: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(number: u32, status: VersionStatus) -> Version {
        Version {
            store_name: "orders".into(),
            number,
            push_job_id: format!("p-{number}"),
            status,
            partition_count: 4,
            replication_factor: 3,
        }
    }

    #[test]
    fn new_store_has_no_current_version() {
        let store = Store::new("orders".into(), "team".into(), 0, 0);
        assert_eq!(store.current_version, NON_EXISTING_VERSION);
        assert!(store.enable_reads);
        assert!(store.enable_writes);
        assert!(!store.is_hybrid());
    }

    #[test]
    fn retrieve_versions_to_delete_keeps_current_started_and_recent_online() {
        let mut store = Store::new("orders".into(), "team".into(), 0, 0);
        store.current_version = 3;
        store.versions = vec![
            version(1, VersionStatus::Online),
            version(2, VersionStatus::Online),
            version(3, VersionStatus::Online),
            version(4, VersionStatus::Started),
        ];

        let to_delete = store.retrieve_versions_to_delete(1);
        let numbers: Vec<u32> = to_delete.iter().map(|v| v.number).collect();
        // keep current (3), most recent online (3, already current), started (4)
        // so only v1 and v2 should be marked for deletion, minus whichever
        // overlaps with "most recent online" (v3, already excluded as current).
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn started_versions_above_current_excludes_started_below_current() {
        let mut store = Store::new("orders".into(), "team".into(), 0, 0);
        store.current_version = 2;
        store.versions = vec![
            version(1, VersionStatus::Started),
            version(3, VersionStatus::Started),
        ];
        let started = store.started_versions_above_current();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].number, 3);
    }

    #[test]
    fn store_config_is_migrating_requires_both_src_and_dest() {
        let mut cfg = StoreConfig::new("orders".into(), "cluster-a".into());
        assert!(!cfg.is_migrating());
        cfg.migration_src = Some("cluster-a".into());
        assert!(!cfg.is_migrating());
        cfg.migration_dest = Some("cluster-b".into());
        assert!(cfg.is_migrating());
    }

    use proptest::prelude::*;

    fn arb_status() -> impl Strategy<Value = VersionStatus> {
        prop_oneof![
            Just(VersionStatus::Started),
            Just(VersionStatus::Online),
            Just(VersionStatus::Error),
        ]
    }

    fn arb_store() -> impl Strategy<Value = Store> {
        (1u32..=3, prop::collection::vec((1u32..=6, arb_status()), 1..8)).prop_map(|(current, raw)| {
            let mut store = Store::new("orders".into(), "team".into(), 0, 0);
            store.current_version = current as i32;
            let mut seen = std::collections::HashSet::new();
            store.versions = raw
                .into_iter()
                .filter(|(number, _)| seen.insert(*number))
                .map(|(number, status)| version(number, status))
                .collect();
            store
        })
    }

    proptest! {
        /// `retrieve_versions_to_delete` never marks `current_version` or
        /// any `Started` version for deletion, regardless of how many
        /// versions exist or `min_to_preserve`'s value.
        #[test]
        fn retrieve_versions_to_delete_never_touches_current_or_started(
            store in arb_store(),
            min_to_preserve in 0usize..4,
        ) {
            let to_delete = store.retrieve_versions_to_delete(min_to_preserve);
            for v in &to_delete {
                prop_assert_ne!(v.number as i32, store.current_version);
                prop_assert_ne!(v.status, VersionStatus::Started);
            }
        }

        /// The set of versions to delete is always a subset of the
        /// store's own versions.
        #[test]
        fn retrieve_versions_to_delete_is_a_subset(
            store in arb_store(),
            min_to_preserve in 0usize..4,
        ) {
            let to_delete = store.retrieve_versions_to_delete(min_to_preserve);
            let known: std::collections::HashSet<u32> = store.versions.iter().map(|v| v.number).collect();
            for v in &to_delete {
                prop_assert!(known.contains(&v.number));
            }
        }
    }
}
