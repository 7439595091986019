mod engine;
mod options;

pub use engine::StoreLifecycleEngine;
pub use options::{HybridConfigUpdate, UpdateStoreOptions};
