//! # MetaWeave - Metagenome De Bruijn Graph Engine
//!
//! Turns raw short-read sequencing data into maximal non-branching unitig
//! sequences and projects new samples onto pre-computed connected
//! components of the unitig graph as normalized feature vectors.
//!
//! The heavy lifting happens in three subsystems: a sharded concurrent
//! k-mer frequency table ([`core::sharded_map`]), a traversal engine that
//! emits each unitig exactly once across the forward/reverse-complement
//! symmetry ([`graph::unitigs`]), and a parallel feature-vector builder
//! ([`features::builder`]). The [`pipeline`] module wires them into the
//! two tool flows.
//!
//! Reads decoding (FASTQ/FASTA/binary), quality filtering, and
//! connected-component discovery are upstream collaborators: both flows
//! consume plain DNA string iterators and a binary components file.

pub mod core;
pub mod counting;
pub mod error;
pub mod features;
pub mod graph;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types at crate level
pub use crate::core::components::ConnectedComponent;
pub use crate::core::sharded_map::ShardedKmerMap;
pub use crate::core::unitig::Unitig;
pub use crate::error::PipelineError;
pub use crate::pipeline::{build_sequences, calculate_features, BuildSummary, SampleSource};
pub use crate::utils::configuration::{BuildConfig, FeaturesConfig};

/// Result type used throughout the crate
pub type Result<T> = anyhow::Result<T>;

/// Error type used throughout the crate
pub type Error = anyhow::Error;
