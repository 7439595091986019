//! Metadata store adapter: the `MetadataStore` trait, its
//! pluggable schema compatibility checker, and an in-memory implementation.

mod compatibility;
mod memory;
mod traits;

pub use compatibility::{DefaultCompatibilityChecker, SchemaCompatibilityChecker};
pub use memory::{new_in_memory_metadata_store, InMemoryMetadataStore};
pub use traits::{MetadataStore, StampedStore};
