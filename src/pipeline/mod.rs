//! Pipeline orchestration
//! ======================
//!
//! The two tool flows built from the stage modules:
//!
//! - [`build_sequences`]: reads -> k-mer counting -> threshold selection ->
//!   branching-k-mer ban -> unitig traversal -> FASTA plus summary files;
//! - [`calculate_features`]: connected components + samples -> normalized
//!   feature vectors, one file per sample under `vectors/`.
//!
//! Decoding of reads files stays upstream: both flows consume plain DNA
//! string iterators.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::components::read_components;
use crate::core::sharded_map::ShardedKmerMap;
use crate::counting::histogram::{select_threshold, FrequencyHistogram};
use crate::counting::pipeline::{scatter_reads, CountingConfig, InsertMode};
use crate::error::PipelineError;
use crate::features::builder::{
    apply_kmer_file_sample, apply_reads_sample, component_vector, seed_component_table,
};
use crate::graph::neighbors::ban_branching_kmers;
use crate::graph::unitigs::{emit_unitigs, TraversalConfig};
use crate::utils::configuration::{BuildConfig, FeaturesConfig};
use crate::utils::format_writers::{
    write_distribution, write_seq_info, write_vector, UnitigFastaWriter,
};

pub const SEQUENCES_FILENAME: &str = "sequences.fasta";
pub const DISTRIBUTION_FILENAME: &str = "distribution";
pub const SEQ_INFO_FILENAME: &str = "seq-info";
pub const VECTORS_DIRNAME: &str = "vectors";

/// What the sequence-building flow produced.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    /// Highest count treated as erroneous.
    pub threshold: u32,
    pub unitigs: u64,
    pub n50: usize,
    /// Distinct canonical k-mers counted from the input.
    pub distinct_kmers: u64,
    /// Total k-mer occurrences counted from the input.
    pub total_kmers: u64,
    /// Distinct k-mer windows covered by emitted unitigs.
    pub kmers_in_unitigs: u64,
    /// Summed path weights of emitted unitigs.
    pub total_kmers_in_unitigs: u64,
    pub sequences_path: PathBuf,
}

/// Runs the full sequence-building flow over a stream of DNA reads.
pub fn build_sequences<I>(config: &BuildConfig, reads: I) -> Result<BuildSummary>
where
    I: IntoIterator<Item = Result<String>>,
{
    config.validate()?;
    std::fs::create_dir_all(&config.work_dir)
        .map_err(|e| PipelineError::io(&config.work_dir, e))?;

    let table = ShardedKmerMap::new(config.k, config.max_size, config.workers);
    debug!(
        "table: {} shards, {} bytes committed",
        table.shard_count(),
        table.capacity_bytes()
    );
    let counting = CountingConfig::with_workers(config.workers);
    let summary = scatter_reads(&table, reads, &counting, InsertMode::Accumulate)?;
    info!(
        "counted {} k-mer occurrences from {} reads",
        summary.kmers, summary.reads
    );
    if table.size() == 0 {
        return Err(PipelineError::EmptyResult(
            "no reads yielded k-mers".to_string(),
        )
        .into());
    }

    let histogram = FrequencyHistogram::from_table(&table);
    write_distribution(&histogram, config.work_dir.join(DISTRIBUTION_FILENAME))?;

    let threshold = select_threshold(&histogram, config.threshold_mode())?;
    info!("maximal bad frequency = {threshold}");

    ban_branching_kmers(&table, threshold);

    let sequences_path = config.work_dir.join(SEQUENCES_FILENAME);
    let mut fasta = UnitigFastaWriter::create(&sequences_path)?;
    let mut seq_records: Vec<(usize, u64)> = Vec::new();
    let mut kmers_in_unitigs = 0u64;
    let mut total_kmers_in_unitigs = 0u64;

    let traversal = TraversalConfig {
        frequency_threshold: threshold,
        min_length: config.sequence_len,
        workers: config.workers,
    };
    let emitted = emit_unitigs(&table, &traversal, |unitig| {
        fasta.append(&unitig)?;
        seq_records.push((unitig.len(), unitig.mean_weight(config.k)));
        kmers_in_unitigs += unitig.kmer_span(config.k);
        total_kmers_in_unitigs += unitig.sum_weight;
        Ok(())
    })?;
    fasta.finish()?;
    write_seq_info(&seq_records, config.work_dir.join(SEQ_INFO_FILENAME))?;

    let n50 = n50(seq_records.iter().map(|&(len, _)| len));
    info!("{emitted} sequences found");
    info!(
        "{} unique k-mers out of {} in sequences",
        kmers_in_unitigs,
        table.size()
    );
    info!("total k-mers in sequences = {total_kmers_in_unitigs}");
    info!("N50 value of sequences = {n50}");

    Ok(BuildSummary {
        threshold,
        unitigs: emitted,
        n50,
        distinct_kmers: histogram.distinct_kmers,
        total_kmers: histogram.total_kmers,
        kmers_in_unitigs,
        total_kmers_in_unitigs,
        sequences_path,
    })
}

/// One sample to project onto the components.
pub enum SampleSource {
    /// A decoded reads stream; the vector normalizer is 1.
    Reads {
        name: String,
        reads: Box<dyn Iterator<Item = Result<String>>>,
    },
    /// A binary k-mer count file; the normalizer is the sample's total
    /// count above the threshold.
    KmerFile { path: PathBuf },
}

impl SampleSource {
    fn vector_file_name(&self) -> String {
        match self {
            SampleSource::Reads { name, .. } => format!("{name}.vec"),
            SampleSource::KmerFile { path } => {
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "sample".to_string());
                let stem = file_name
                    .strip_suffix(".kmers.bin")
                    .unwrap_or_else(|| file_name.trim_end_matches(".bin"));
                format!("{stem}.vec")
            }
        }
    }
}

/// Runs the feature-calculation flow: one normalized vector file per
/// sample, written under `<work_dir>/vectors/` in component order.
pub fn calculate_features(
    config: &FeaturesConfig,
    samples: Vec<SampleSource>,
) -> Result<Vec<PathBuf>> {
    config.validate()?;

    let mut components = read_components(&config.components_file)?;
    if components.is_empty() {
        return Err(PipelineError::EmptyResult(format!(
            "no components found in {}",
            config.components_file.display()
        ))
        .into());
    }
    for component in &mut components {
        component.normalize(config.k);
    }
    info!(
        "{} components loaded from {}",
        components.len(),
        config.components_file.display()
    );

    let table = seed_component_table(&components, config.k, config.max_size, config.workers)?;
    debug!("k-mers in components = {}", table.size());

    let vectors_dir = config.work_dir.join(VECTORS_DIRNAME);
    std::fs::create_dir_all(&vectors_dir).map_err(|e| PipelineError::io(&vectors_dir, e))?;

    let mut written = Vec::with_capacity(samples.len());
    for sample in samples {
        table.reset_values();
        let out_path = vectors_dir.join(sample.vector_file_name());
        let normalizer = match sample {
            SampleSource::Reads { reads, .. } => {
                apply_reads_sample(&table, reads, config.workers)?;
                1.0
            }
            SampleSource::KmerFile { path } => {
                apply_kmer_file_sample(&table, &path, config.threshold)? as f64
            }
        };
        let vector = component_vector(&components, &table, config.threshold, config.workers);
        write_vector(&vector, normalizer, &out_path)
            .with_context(|| format!("writing feature vector {}", out_path.display()))?;
        info!("features printed to {}", out_path.display());
        written.push(out_path);
    }

    Ok(written)
}

/// Shortest length among the unitigs covering half of the assembled bases.
fn n50(lengths: impl Iterator<Item = usize>) -> usize {
    let mut sorted: Vec<usize> = lengths.collect();
    sorted.sort_unstable();
    let total: u64 = sorted.iter().map(|&l| l as u64).sum();
    let mut top = 0u64;
    for &len in sorted.iter().rev() {
        top += len as u64;
        if top * 2 >= total {
            return len;
        }
    }
    0
}
