//! Venice controller core -- domain model, error enumeration, and
//! property-map configuration.
//!
//! This crate provides the foundation layer shared by every adapter and by
//! the store lifecycle engine in `venice-controller`:
//!
//! - **Model** ([`model`]): `Store`, `Version`, `StoreConfig` (discovery),
//!   `GraveyardEntry`, `SchemaEntry`.
//! - **Error** ([`error`]): `ControllerError`, the single error enumeration
//!   every component returns.
//! - **Config** ([`config`]): `ControllerConfig`, parsed from the
//!   environment-agnostic property map.

pub mod config;
pub mod error;
pub mod model;

pub use config::{ConfigError, ControllerConfig};
pub use error::ControllerError;
pub use model::{
    CompressionStrategy, GraveyardEntry, HybridStoreConfig, SchemaEntry, Store, StoreConfig,
    Version, VersionStatus, DEFAULT_PARTITION_COUNT, IGNORE_VERSION, KEY_SCHEMA_ID,
    NON_EXISTING_VERSION, UNLIMITED_STORAGE_QUOTA,
};
