//! Error kinds shared across the pipeline stages.

use std::path::PathBuf;
use thiserror::Error;

/// Failure categories surfaced at stage boundaries.
///
/// Worker threads aggregate into the first error observed; `InvalidInput`
/// is raised during validation, before any output file is opened.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("shard {shard} is full: cannot grow past {max_entries} entries")]
    CapacityExhausted { shard: usize, max_entries: usize },

    #[error("I/O failure on {path}")]
    IoFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("empty result: {0}")]
    EmptyResult(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoFailure {
            path: path.into(),
            source,
        }
    }
}
