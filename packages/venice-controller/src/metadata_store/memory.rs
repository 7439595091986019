//! In-memory metadata store adapter.
//!
//! Stands in for the durable, strongly-consistent key/value space a real
//! deployment would back with an external collaborator. Built on
//! `DashMap` for per-key concurrency plus a `stamp: u64` CAS counter per
//! row.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use venice_controller_types::{
    ControllerError, GraveyardEntry, SchemaEntry, Store, StoreConfig, KEY_SCHEMA_ID,
};

use super::compatibility::{DefaultCompatibilityChecker, SchemaCompatibilityChecker};
use super::traits::{MetadataStore, StampedStore};
use crate::ControllerResult;

struct StoreRow {
    store: Store,
    stamp: u64,
}

/// In-memory `MetadataStore` adapter, suitable for embedding a controller
/// core in tests or a single-process deployment.
pub struct InMemoryMetadataStore {
    stores: DashMap<(String, String), StoreRow>,
    configs: DashMap<String, StoreConfig>,
    graveyard: DashMap<String, GraveyardEntry>,
    key_schemas: DashMap<String, String>,
    value_schemas: DashMap<String, Arc<Mutex<Vec<SchemaEntry>>>>,
    execution_ids: DashMap<String, AtomicU64>,
    compatibility: Box<dyn SchemaCompatibilityChecker>,
}

impl InMemoryMetadataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_compatibility_checker(Box::new(DefaultCompatibilityChecker))
    }

    #[must_use]
    pub fn with_compatibility_checker(checker: Box<dyn SchemaCompatibilityChecker>) -> Self {
        Self {
            stores: DashMap::new(),
            configs: DashMap::new(),
            graveyard: DashMap::new(),
            key_schemas: DashMap::new(),
            value_schemas: DashMap::new(),
            execution_ids: DashMap::new(),
            compatibility: checker,
        }
    }
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get_store(&self, cluster: &str, name: &str) -> ControllerResult<StampedStore> {
        self.stores
            .get(&(cluster.to_string(), name.to_string()))
            .map(|row| StampedStore {
                store: row.store.clone(),
                stamp: row.stamp,
            })
            .ok_or_else(|| ControllerError::NotFound(format!("store '{name}' in cluster '{cluster}'")))
    }

    async fn list_stores(&self, cluster: &str) -> ControllerResult<Vec<Store>> {
        Ok(self
            .stores
            .iter()
            .filter(|entry| entry.key().0 == cluster)
            .map(|entry| entry.value().store.clone())
            .collect())
    }

    async fn add_store(&self, cluster: &str, store: Store) -> ControllerResult<u64> {
        let key = (cluster.to_string(), store.store_name.clone());
        if self.stores.contains_key(&key) {
            return Err(ControllerError::AlreadyExists(format!(
                "store '{}' in cluster '{cluster}'",
                store.store_name
            )));
        }
        self.stores.insert(key, StoreRow { store, stamp: 0 });
        Ok(0)
    }

    async fn compare_and_set_store(
        &self,
        cluster: &str,
        name: &str,
        expected_stamp: u64,
        new_store: Store,
    ) -> ControllerResult<u64> {
        let mut row = self
            .stores
            .get_mut(&(cluster.to_string(), name.to_string()))
            .ok_or_else(|| ControllerError::NotFound(format!("store '{name}' in cluster '{cluster}'")))?;

        if row.stamp != expected_stamp {
            return Err(ControllerError::ConcurrentUpdate(name.to_string()));
        }

        row.store = new_store;
        row.stamp += 1;
        Ok(row.stamp)
    }

    async fn delete_store(&self, cluster: &str, name: &str) -> ControllerResult<()> {
        self.stores.remove(&(cluster.to_string(), name.to_string()));
        Ok(())
    }

    async fn get_store_config(&self, name: &str) -> ControllerResult<StoreConfig> {
        self.configs
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ControllerError::NotFound(format!("store config '{name}'")))
    }

    async fn put_store_config(&self, config: StoreConfig) -> ControllerResult<()> {
        self.configs.insert(config.store_name.clone(), config);
        Ok(())
    }

    async fn delete_store_config(&self, name: &str) -> ControllerResult<()> {
        self.configs.remove(name);
        Ok(())
    }

    async fn get_largest_used_version_from_graveyard(&self, name: &str) -> ControllerResult<i32> {
        Ok(self
            .graveyard
            .get(name)
            .map_or(0, |entry| entry.largest_used_version_number))
    }

    async fn put_graveyard(&self, name: &str, largest_used_version_number: i32) -> ControllerResult<()> {
        self.graveyard
            .entry(name.to_string())
            .and_modify(|entry| {
                entry.largest_used_version_number =
                    entry.largest_used_version_number.max(largest_used_version_number);
            })
            .or_insert(GraveyardEntry {
                largest_used_version_number,
            });
        Ok(())
    }

    async fn add_key_schema(&self, store: &str, schema: &str) -> ControllerResult<u32> {
        self.key_schemas
            .entry(store.to_string())
            .or_insert_with(|| schema.to_string());
        Ok(KEY_SCHEMA_ID)
    }

    async fn get_key_schema(&self, store: &str) -> ControllerResult<Option<String>> {
        Ok(self.key_schemas.get(store).map(|entry| entry.clone()))
    }

    async fn add_value_schema(&self, store: &str, schema: &str) -> ControllerResult<u32> {
        let entry = self
            .value_schemas
            .entry(store.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .clone();

        let mut schemas = entry.lock();

        if let Some(existing) = schemas.iter().find(|s| s.schema == schema) {
            return Ok(existing.id);
        }

        for existing in schemas.iter() {
            if !self.compatibility.is_compatible(&existing.schema, schema) {
                return Err(ControllerError::SchemaIncompatible {
                    store: store.to_string(),
                    reason: format!(
                        "candidate schema is not compatible with existing schema id {}",
                        existing.id
                    ),
                });
            }
        }

        let next_id = schemas.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        schemas.push(SchemaEntry {
            id: next_id,
            schema: schema.to_string(),
        });
        Ok(next_id)
    }

    async fn get_value_schemas(&self, store: &str) -> ControllerResult<Vec<SchemaEntry>> {
        Ok(self
            .value_schemas
            .get(store)
            .map(|entry| entry.lock().clone())
            .unwrap_or_default())
    }

    async fn next_execution_id(&self, cluster: &str) -> ControllerResult<u64> {
        let counter = self
            .execution_ids
            .entry(cluster.to_string())
            .or_insert_with(|| AtomicU64::new(0));
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Convenience constructor mirroring the property-map boundary: not used
/// by the in-memory adapter itself, kept for symmetry with
/// `ControllerConfig::from_properties` at the call site that wires up a
/// controller.
#[must_use]
pub fn new_in_memory_metadata_store(_props: &HashMap<String, String>) -> InMemoryMetadataStore {
    InMemoryMetadataStore::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store(name: &str) -> Store {
        Store::new(name.to_string(), "team".to_string(), 0, 0)
    }

    #[tokio::test]
    async fn add_then_get_store_round_trips() {
        let md = InMemoryMetadataStore::new();
        md.add_store("cluster-a", sample_store("orders")).await.unwrap();
        let stamped = md.get_store("cluster-a", "orders").await.unwrap();
        assert_eq!(stamped.store.store_name, "orders");
        assert_eq!(stamped.stamp, 0);
    }

    #[tokio::test]
    async fn add_store_twice_fails_already_exists() {
        let md = InMemoryMetadataStore::new();
        md.add_store("cluster-a", sample_store("orders")).await.unwrap();
        let err = md.add_store("cluster-a", sample_store("orders")).await.unwrap_err();
        assert!(matches!(err, ControllerError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn compare_and_set_rejects_stale_stamp() {
        let md = InMemoryMetadataStore::new();
        md.add_store("cluster-a", sample_store("orders")).await.unwrap();
        let stamped = md.get_store("cluster-a", "orders").await.unwrap();

        md.compare_and_set_store("cluster-a", "orders", stamped.stamp, stamped.store.clone())
            .await
            .unwrap();

        // Stale stamp from before the successful update above.
        let err = md
            .compare_and_set_store("cluster-a", "orders", stamped.stamp, stamped.store)
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::ConcurrentUpdate(_)));
    }

    #[tokio::test]
    async fn graveyard_preserves_max_across_repeated_deletes() {
        let md = InMemoryMetadataStore::new();
        md.put_graveyard("orders", 5).await.unwrap();
        md.put_graveyard("orders", 3).await.unwrap();
        assert_eq!(
            md.get_largest_used_version_from_graveyard("orders").await.unwrap(),
            5
        );
    }

    #[tokio::test]
    async fn value_schema_registration_is_idempotent() {
        let md = InMemoryMetadataStore::new();
        let id1 = md.add_value_schema("orders", "\"string\"").await.unwrap();
        let id2 = md.add_value_schema("orders", "\"string\"").await.unwrap();
        assert_eq!(id1, id2);
        assert_eq!(id1, 1);
    }

    #[tokio::test]
    async fn value_schema_incompatible_is_rejected() {
        let md = InMemoryMetadataStore::new();
        md.add_value_schema("orders", "\"string\"").await.unwrap();
        let err = md.add_value_schema("orders", "\"int\"").await.unwrap_err();
        assert!(matches!(err, ControllerError::SchemaIncompatible { .. }));
    }

    #[tokio::test]
    async fn value_schema_compatible_record_gets_next_id() {
        let md = InMemoryMetadataStore::new();
        md.add_value_schema("orders", "\"string\"").await.unwrap();
        let record = r#"{"type":"record","name":"R","fields":[{"name":"a","type":"string"}]}"#;
        let id = md.add_value_schema("orders", record).await.unwrap();
        assert_eq!(id, 2);
    }

    #[tokio::test]
    async fn execution_ids_are_monotonic_per_cluster() {
        let md = InMemoryMetadataStore::new();
        assert_eq!(md.next_execution_id("cluster-a").await.unwrap(), 1);
        assert_eq!(md.next_execution_id("cluster-a").await.unwrap(), 2);
        assert_eq!(md.next_execution_id("cluster-b").await.unwrap(), 1);
    }
}
