//! Resource coordinator adapter.

mod memory;
mod traits;

pub use memory::InMemoryResourceCoordinator;
pub use traits::{ClusterTopology, ExternalView, Rebalancer, ResourceCoordinator};
