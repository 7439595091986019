//! `updateStore` option set. Every field is independently
//! nullable; only the options actually present are applied, in the fixed
//! order listed here.

use venice_controller_types::{CompressionStrategy, HybridStoreConfig};

#[derive(Debug, Clone, Default)]
pub struct HybridConfigUpdate {
    pub rewind_seconds: Option<i64>,
    pub offset_lag_threshold: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateStoreOptions {
    pub owner: Option<String>,
    pub enable_reads: Option<bool>,
    pub enable_writes: Option<bool>,
    pub partition_count: Option<u32>,
    pub storage_quota_bytes: Option<i64>,
    pub read_quota_cu: Option<u64>,
    pub current_version: Option<i32>,
    pub largest_used_version_number: Option<i32>,
    pub hybrid_config: Option<HybridConfigUpdate>,
    pub access_controlled: Option<bool>,
    pub compression_strategy: Option<CompressionStrategy>,
    pub chunking_enabled: Option<bool>,
    pub router_cache_single_get_enabled: Option<bool>,
    pub router_cache_batch_get_enabled: Option<bool>,
    pub batch_get_limit: Option<i32>,
    pub num_versions_to_preserve: Option<u32>,
    pub incremental_push_enabled: Option<bool>,
    pub migrating: Option<bool>,
}

pub(crate) fn merge_hybrid_config(
    existing: Option<HybridStoreConfig>,
    update: &HybridConfigUpdate,
) -> Result<Option<HybridStoreConfig>, String> {
    if update.rewind_seconds.is_none() && update.offset_lag_threshold.is_none() && existing.is_none() {
        return Ok(existing);
    }

    match existing {
        Some(mut hybrid) => {
            if let Some(r) = update.rewind_seconds {
                hybrid.rewind_seconds = r;
            }
            if let Some(l) = update.offset_lag_threshold {
                hybrid.offset_lag_threshold = l;
            }
            Ok(Some(hybrid))
        }
        None => match (update.rewind_seconds, update.offset_lag_threshold) {
            (Some(rewind_seconds), Some(offset_lag_threshold)) => Ok(Some(HybridStoreConfig {
                rewind_seconds,
                offset_lag_threshold,
            })),
            _ => Err("transitioning a store to hybrid requires both rewindSeconds and offsetLagThreshold".to_string()),
        },
    }
}
