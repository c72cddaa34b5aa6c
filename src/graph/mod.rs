pub mod neighbors;
pub mod unitigs;

pub use neighbors::ban_branching_kmers;
pub use unitigs::{emit_unitigs, TraversalConfig};
