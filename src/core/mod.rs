pub mod components;
pub mod kmer;
pub mod sharded_map;
pub mod unitig;

// Re-export key types for pipeline integration
pub use components::ConnectedComponent;
pub use sharded_map::{ShardedKmerMap, BAN_MARKER};
pub use unitig::Unitig;
