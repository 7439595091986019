//! Metadata store adapter contract.
//!
//! A narrow, `Send + Sync`, `async_trait` interface. Callers
//! serialize multi-key invariants themselves using the per-cluster/
//! per-store locks in [`crate::locks`]; the trait itself only promises
//! linearizable reads and writes per key.

use async_trait::async_trait;
use venice_controller_types::{SchemaEntry, Store, StoreConfig};

use crate::ControllerResult;

/// A store row plus the opaque compare-and-set stamp it was read with.
#[derive(Debug, Clone)]
pub struct StampedStore {
    pub store: Store,
    pub stamp: u64,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Reads a store along with its current CAS stamp. `NotFound` if the
    /// cluster has no store by that name.
    async fn get_store(&self, cluster: &str, name: &str) -> ControllerResult<StampedStore>;

    /// Lists every store registered for a cluster.
    async fn list_stores(&self, cluster: &str) -> ControllerResult<Vec<Store>>;

    /// Inserts a brand-new store. `AlreadyExists` if one is already present.
    async fn add_store(&self, cluster: &str, store: Store) -> ControllerResult<u64>;

    /// Compare-and-set update: succeeds only if `expected_stamp` still
    /// matches the stored row, returning the new stamp. `ConcurrentUpdate`
    /// on a stale stamp; `NotFound` if the store no longer exists.
    async fn compare_and_set_store(
        &self,
        cluster: &str,
        name: &str,
        expected_stamp: u64,
        new_store: Store,
    ) -> ControllerResult<u64>;

    /// Removes a store's row entirely. Idempotent.
    async fn delete_store(&self, cluster: &str, name: &str) -> ControllerResult<()>;

    /// Reads the discovery row for a store. `NotFound` if none exists.
    async fn get_store_config(&self, name: &str) -> ControllerResult<StoreConfig>;

    /// Upserts the discovery row for a store.
    async fn put_store_config(&self, config: StoreConfig) -> ControllerResult<()>;

    /// Removes the discovery row for a store. Idempotent.
    async fn delete_store_config(&self, name: &str) -> ControllerResult<()>;

    /// Reads the largest used version number recorded in the graveyard for
    /// a store name, or `0` if the name has never been buried.
    async fn get_largest_used_version_from_graveyard(&self, name: &str) -> ControllerResult<i32>;

    /// Records a deleted store's largest used version number in the
    /// graveyard, preserving the larger of the existing and new value.
    async fn put_graveyard(&self, name: &str, largest_used_version_number: i32) -> ControllerResult<()>;

    /// Registers a store's key schema, always under [`venice_controller_types::KEY_SCHEMA_ID`].
    /// Idempotent: calling it again with the same schema is a no-op.
    async fn add_key_schema(&self, store: &str, schema: &str) -> ControllerResult<u32>;

    /// Reads a store's registered key schema, if any. Needed by
    /// `migrate_store` to carry the key schema across to
    /// the destination cluster.
    async fn get_key_schema(&self, store: &str) -> ControllerResult<Option<String>>;

    /// Registers a candidate value schema. Returns the existing id if an
    /// identical schema is already registered (idempotent); otherwise
    /// checks compatibility against every existing schema and assigns
    /// `max(existing.id) + 1`, or fails `SchemaIncompatible`.
    async fn add_value_schema(&self, store: &str, schema: &str) -> ControllerResult<u32>;

    /// Lists every registered value schema for a store, oldest id first.
    async fn get_value_schemas(&self, store: &str) -> ControllerResult<Vec<SchemaEntry>>;

    /// Hands out the next execution id for a cluster's admin operations.
    /// Monotonically increasing, starting at 1.
    async fn next_execution_id(&self, cluster: &str) -> ControllerResult<u64>;
}
