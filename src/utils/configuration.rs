//! Configuration for the two pipeline flows.
//!
//! A CLI shell (out of scope here) assigns flags to these fields; the
//! structs validate themselves before any output file is opened.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::counting::histogram::ThresholdMode;
use crate::error::PipelineError;

/// Largest k the 2-bit codec supports.
const MAX_K: usize = crate::core::kmer::MAX_K;

/// Default soft memory cap for the frequency table.
const DEFAULT_MAX_SIZE_BYTES: u64 = 1 << 30;

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_max_size() -> u64 {
    DEFAULT_MAX_SIZE_BYTES
}

fn default_threshold() -> u32 {
    0
}

/// Settings for the sequence-building flow: count k-mers, pick the
/// erroneous cutoff, and emit unitigs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// K-mer size (1..=31).
    pub k: usize,
    /// Minimum unitig length written to the FASTA output.
    pub sequence_len: usize,
    /// Absolute erroneous-frequency cutoff; mutually exclusive with
    /// `bottom_cut_percent`.
    #[serde(default)]
    pub maximal_bad_frequency: Option<u32>,
    /// Percent of total k-mer occurrences assumed erroneous; mutually
    /// exclusive with `maximal_bad_frequency`.
    #[serde(default)]
    pub bottom_cut_percent: Option<u32>,
    /// Soft memory cap for the frequency table, in bytes.
    #[serde(default = "default_max_size")]
    pub max_size: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Directory receiving all intermediate and output files.
    pub work_dir: PathBuf,
}

impl BuildConfig {
    pub fn new(k: usize, sequence_len: usize, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            k,
            sequence_len,
            maximal_bad_frequency: None,
            bottom_cut_percent: None,
            max_size: DEFAULT_MAX_SIZE_BYTES,
            workers: default_workers(),
            work_dir: work_dir.into(),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.k == 0 || self.k > MAX_K {
            return Err(PipelineError::InvalidInput(format!(
                "k = {} outside supported range 1..={MAX_K}",
                self.k
            )));
        }
        if self.maximal_bad_frequency.is_some() && self.bottom_cut_percent.is_some() {
            return Err(PipelineError::InvalidInput(
                "maximal-bad-frequency and bottom-cut-percent cannot both be set".to_string(),
            ));
        }
        if let Some(percent) = self.bottom_cut_percent {
            if percent > 100 {
                return Err(PipelineError::InvalidInput(format!(
                    "bottom-cut-percent {percent} outside 0..=100"
                )));
            }
        }
        if self.workers == 0 {
            return Err(PipelineError::InvalidInput(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Threshold selection mode implied by the optional cutoff fields.
    pub fn threshold_mode(&self) -> ThresholdMode {
        match (self.maximal_bad_frequency, self.bottom_cut_percent) {
            (Some(t), _) => ThresholdMode::Absolute(t),
            (None, Some(p)) => ThresholdMode::BottomPercent(p),
            (None, None) => ThresholdMode::Auto,
        }
    }
}

/// Settings for the feature-calculation flow: project samples onto
/// connected components and write one vector per sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// K-mer size (1..=31); must match the components file.
    pub k: usize,
    /// Path to the binary connected-components file.
    pub components_file: PathBuf,
    /// Highest count still treated as erroneous when summing vectors.
    #[serde(default = "default_threshold")]
    pub threshold: u32,
    /// Soft memory cap for the component table, in bytes.
    #[serde(default = "default_max_size")]
    pub max_size: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Directory whose `vectors/` subdirectory receives the output.
    pub work_dir: PathBuf,
}

impl FeaturesConfig {
    pub fn new(
        k: usize,
        components_file: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            k,
            components_file: components_file.into(),
            threshold: 0,
            max_size: DEFAULT_MAX_SIZE_BYTES,
            workers: default_workers(),
            work_dir: work_dir.into(),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.k == 0 || self.k > MAX_K {
            return Err(PipelineError::InvalidInput(format!(
                "k = {} outside supported range 1..={MAX_K}",
                self.k
            )));
        }
        if self.workers == 0 {
            return Err(PipelineError::InvalidInput(
                "worker count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_config_defaults() {
        let config = BuildConfig::new(21, 100, "/tmp/run");
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold_mode(), ThresholdMode::Auto);
        assert!(config.workers >= 1);
    }

    #[test]
    fn test_k_bounds() {
        let mut config = BuildConfig::new(0, 100, "/tmp/run");
        assert!(config.validate().is_err());
        config.k = 32;
        assert!(config.validate().is_err());
        config.k = 31;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_threshold_modes_are_exclusive() {
        let mut config = BuildConfig::new(21, 100, "/tmp/run");
        config.maximal_bad_frequency = Some(2);
        assert_eq!(config.threshold_mode(), ThresholdMode::Absolute(2));
        config.bottom_cut_percent = Some(10);
        assert!(config.validate().is_err());
        config.maximal_bad_frequency = None;
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold_mode(), ThresholdMode::BottomPercent(10));
    }

    #[test]
    fn test_bottom_cut_percent_range() {
        let mut config = BuildConfig::new(21, 100, "/tmp/run");
        config.bottom_cut_percent = Some(101);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_features_config_validation() {
        let config = FeaturesConfig::new(21, "/tmp/components.bin", "/tmp/run");
        assert!(config.validate().is_ok());
        let mut bad = config.clone();
        bad.workers = 0;
        assert!(bad.validate().is_err());
    }
}
