pub mod builder;

pub use builder::{
    apply_kmer_file_sample, apply_reads_sample, component_vector, seed_component_table,
};
