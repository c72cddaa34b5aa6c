pub mod histogram;
pub mod kmer_files;
pub mod pipeline;

pub use histogram::{FrequencyHistogram, ThresholdMode, STAT_LEN};
pub use pipeline::{CountingConfig, CountingSummary, InsertMode};
