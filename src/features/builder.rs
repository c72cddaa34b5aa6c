//! Feature-vector construction over connected components
//! =====================================================
//!
//! A sample (reads or a binary k-mer count file) is projected onto the
//! pre-computed connected components of the unitig graph: a table seeded
//! with every component k-mer (value 0) receives the sample's occurrence
//! counts, then each component's slot sums its members' counts above the
//! threshold. Slots are computed in parallel over contiguous slices of the
//! component list, so output order matches input order exactly.

use std::path::Path;

use anyhow::Result;
use rayon::prelude::*;
use tracing::debug;

use crate::core::components::ConnectedComponent;
use crate::core::sharded_map::ShardedKmerMap;
use crate::counting::kmer_files::KmerFileReader;
use crate::counting::pipeline::{scatter_reads, CountingConfig, InsertMode};
use crate::error::PipelineError;

/// Builds a table holding every component k-mer with value 0.
///
/// Components must be normalized first; the table canonicalizes keys, so a
/// k-mer listed in both orientations would otherwise seed one entry but
/// sum twice.
pub fn seed_component_table(
    components: &[ConnectedComponent],
    k: usize,
    memory_budget_bytes: u64,
    workers: usize,
) -> Result<ShardedKmerMap> {
    let table = ShardedKmerMap::new(k, memory_budget_bytes, workers);
    for component in components {
        for &kmer in &component.kmers {
            table.set(kmer, 0)?;
        }
    }
    debug!("seeded {} component k-mers", table.size());
    Ok(table)
}

/// Streams a reads sample into the seeded table, bumping only k-mers that
/// belong to some component. The reads normalizer is 1.
pub fn apply_reads_sample<I>(
    table: &ShardedKmerMap,
    reads: I,
    workers: usize,
) -> Result<()>
where
    I: IntoIterator<Item = Result<String>>,
{
    scatter_reads(
        table,
        reads,
        &CountingConfig::with_workers(workers),
        InsertMode::PresenceOnly,
    )?;
    Ok(())
}

/// Applies a binary k-mer count sample to the seeded table.
///
/// Every record marks presence; the returned normalizer is the total count
/// of records strictly above `threshold`, matching the vector summation
/// rule. An empty sample cannot normalize anything and is an error.
pub fn apply_kmer_file_sample<P: AsRef<Path>>(
    table: &ShardedKmerMap,
    path: P,
    threshold: u32,
) -> Result<u64> {
    let path = path.as_ref();
    let mut total_kmers = 0u64;
    for record in KmerFileReader::open(path)? {
        let (key, count) = record?;
        table.add_if_present(key, count as u32);
        if count as i64 > threshold as i64 {
            total_kmers += count as u64;
        }
    }
    if total_kmers == 0 {
        return Err(PipelineError::EmptyResult(format!(
            "k-mer sample {} holds no counts above threshold {}",
            path.display(),
            threshold
        ))
        .into());
    }
    Ok(total_kmers)
}

/// Sums each component's member counts above `threshold` from the
/// read-only table. Slot `i` belongs to component `i`; workers partition
/// the list contiguously and never touch the same slot.
pub fn component_vector(
    components: &[ConnectedComponent],
    table: &ShardedKmerMap,
    threshold: u32,
    workers: usize,
) -> Vec<u64> {
    let per_worker = components.len().div_ceil(workers.max(1)).max(1);
    components
        .par_chunks(per_worker)
        .flat_map_iter(|slice| {
            slice.iter().map(|component| {
                let mut sum = 0u64;
                for &kmer in &component.kmers {
                    let value = table.get(kmer);
                    if value > threshold as i64 {
                        sum += value as u64;
                    }
                }
                sum
            })
        })
        .collect()
}
