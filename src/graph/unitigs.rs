//! Unitig traversal engine
//! =======================
//!
//! Emits every maximal non-branching path of the frequency-filtered k-mer
//! graph exactly once across the forward/reverse-complement symmetry.
//!
//! Workers claim table shards from a shared cursor, scan each shard's
//! entries for traversal starts (both orientations of every stored key),
//! extend rightward, and push finished unitigs onto a bounded queue that a
//! single writer drains. Deduplication uses the closed-form
//! `min(start, end)` rule on canonical endpoint values, with a small
//! serialized `used` set covering only the palindromic start==end case.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use ahash::AHashSet;
use anyhow::Result;
use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use tracing::debug;

use crate::core::kmer::{canonical, code_base, decode, reverse_complement, shift_right};
use crate::core::sharded_map::ShardedKmerMap;
use crate::core::unitig::Unitig;
use crate::graph::neighbors::{is_left_end, unique_left, unique_right};

/// Finished unitigs buffered between workers and the writer.
const EMISSION_QUEUE_CAPACITY: usize = 1 << 10;

#[derive(Debug, Clone)]
pub struct TraversalConfig {
    /// Highest count still treated as erroneous; probes require `> threshold`.
    pub frequency_threshold: u32,
    /// Unitigs shorter than this many bases are discarded.
    pub min_length: usize,
    pub workers: usize,
}

/// Walks the graph and hands each emitted unitig to `sink` on the calling
/// thread. Returns the number of unitigs emitted.
///
/// The table must not be mutated during traversal; the ban pass, if any,
/// has to complete first.
pub fn emit_unitigs<F>(
    table: &ShardedKmerMap,
    config: &TraversalConfig,
    mut sink: F,
) -> Result<u64>
where
    F: FnMut(Unitig) -> Result<()>,
{
    let (unitig_tx, unitig_rx) = bounded::<Unitig>(EMISSION_QUEUE_CAPACITY);
    let shard_cursor = AtomicUsize::new(0);
    let stop = AtomicBool::new(false);
    let used: Mutex<AHashSet<u64>> = Mutex::new(AHashSet::new());

    let mut emitted = 0u64;
    let mut sink_error: Option<anyhow::Error> = None;

    std::thread::scope(|scope| {
        for _ in 0..config.workers.max(1) {
            let unitig_tx = unitig_tx.clone();
            let shard_cursor = &shard_cursor;
            let stop = &stop;
            let used = &used;
            scope.spawn(move || {
                scan_shards(table, config, shard_cursor, stop, used, unitig_tx);
            });
        }
        drop(unitig_tx);

        for unitig in unitig_rx.iter() {
            if sink_error.is_some() {
                continue; // drain so workers never block on a full queue
            }
            match sink(unitig) {
                Ok(()) => emitted += 1,
                Err(e) => {
                    sink_error = Some(e);
                    stop.store(true, Ordering::Relaxed);
                }
            }
        }
    });

    if let Some(e) = sink_error {
        return Err(e);
    }
    debug!("{emitted} unitigs emitted");
    Ok(emitted)
}

fn scan_shards(
    table: &ShardedKmerMap,
    config: &TraversalConfig,
    shard_cursor: &AtomicUsize,
    stop: &AtomicBool,
    used: &Mutex<AHashSet<u64>>,
    unitig_tx: Sender<Unitig>,
) {
    let k = table.k();
    let threshold = config.frequency_threshold;

    loop {
        let shard = shard_cursor.fetch_add(1, Ordering::Relaxed);
        if shard >= table.shard_count() {
            return;
        }
        for (key, value) in table.shard_entries(shard) {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            if value <= threshold as i64 {
                continue;
            }
            let rc = reverse_complement(key, k);
            // both orientations of the stored key are candidate starts;
            // a palindromic key has only one distinct orientation
            let candidates = [key, rc];
            let orientations: &[u64] = if key == rc {
                &candidates[..1]
            } else {
                &candidates[..]
            };
            for &start in orientations {
                if !is_left_end(table, k, threshold, start) {
                    continue;
                }
                if let Some(unitig) = walk_right(table, k, threshold, config.min_length, start, used)
                {
                    if unitig_tx.send(unitig).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// Extends `start` rightward until the path stops being simple, then
/// applies the length filter and the endpoint deduplication rule.
fn walk_right(
    table: &ShardedKmerMap,
    k: usize,
    threshold: u32,
    min_length: usize,
    start: u64,
    used: &Mutex<AHashSet<u64>>,
) -> Option<Unitig> {
    let mut sequence = decode(start, k);
    let mut current = start;

    let first = table.get(start) as u64;
    let mut sum_weight = first;
    let mut min_weight = first as u32;
    let mut max_weight = first as u32;

    loop {
        let Some(base) = unique_right(table, k, threshold, current) else {
            break;
        };
        let next = shift_right(current, k, base);
        // entering a junction from the right ends the path before it
        if unique_left(table, k, threshold, next).is_none() {
            break;
        }
        sequence.push(code_base(base) as char);
        current = next;

        let value = table.get(next) as u64;
        sum_weight += value;
        min_weight = min_weight.min(value as u32);
        max_weight = max_weight.max(value as u32);
    }

    if sequence.len() < min_length {
        return None;
    }

    let start_key = canonical(start, k);
    let end_key = canonical(current, k);
    if start_key > end_key {
        // the reverse-complement traversal emits this path
        return None;
    }
    if start_key == end_key {
        let mut used = used.lock();
        if !used.insert(start_key) {
            return None;
        }
    }

    Some(Unitig {
        sequence,
        sum_weight,
        min_weight,
        max_weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::pipeline::{scatter_reads, CountingConfig, InsertMode};
    use crate::graph::neighbors::ban_branching_kmers;

    fn table_from_reads(k: usize, reads: &[&str]) -> ShardedKmerMap {
        let table = ShardedKmerMap::new(k, 1 << 20, 2);
        let reads: Vec<anyhow::Result<String>> =
            reads.iter().map(|r| Ok(r.to_string())).collect();
        scatter_reads(
            &table,
            reads,
            &CountingConfig::with_workers(2),
            InsertMode::Accumulate,
        )
        .unwrap();
        table
    }

    fn collect_unitigs(table: &ShardedKmerMap, config: &TraversalConfig) -> Vec<Unitig> {
        let collected = Mutex::new(Vec::new());
        emit_unitigs(table, config, |u| {
            collected.lock().push(u);
            Ok(())
        })
        .unwrap();
        let mut unitigs = collected.into_inner();
        unitigs.sort_by(|a, b| a.sequence.cmp(&b.sequence));
        unitigs
    }

    fn config(min_length: usize) -> TraversalConfig {
        TraversalConfig {
            frequency_threshold: 0,
            min_length,
            workers: 2,
        }
    }

    #[test]
    fn test_simple_chain_emits_once() {
        // the chain AACCGG merges with its reverse complement CCGGTT into
        // one maximal path whose endpoints share a canonical value, so the
        // palindrome rule must keep it to a single copy
        let table = table_from_reads(3, &["AACCGG"]);
        let unitigs = collect_unitigs(&table, &config(4));
        assert_eq!(unitigs.len(), 1);
        let unitig = &unitigs[0];
        assert_eq!(unitig.sequence, "AACCGGTT");
        assert_eq!(unitig.sum_weight, 8);
        assert_eq!(unitig.min_weight, 1);
        assert_eq!(unitig.max_weight, 2);
        assert_eq!(unitig.mean_weight(3), 1);
    }

    #[test]
    fn test_length_filter_drops_short_paths() {
        let table = table_from_reads(3, &["AACCGG"]);
        let unitigs = collect_unitigs(&table, &config(9));
        assert!(unitigs.is_empty());
    }

    #[test]
    fn test_reverse_complement_input_emits_same_unitigs() {
        let forward = table_from_reads(5, &["AATTCCTTGGAACCAA", "CCTTGGAACCAATTGG"]);
        let reverse = table_from_reads(5, &["TTGGTTCCAAGGAATT", "CCAATTGGTTCCAAGG"]);
        let cfg = config(6);

        let canonical_strings = |unitigs: Vec<Unitig>| -> Vec<String> {
            let mut out: Vec<String> = unitigs
                .into_iter()
                .map(|u| {
                    let rc: String = u
                        .sequence
                        .bytes()
                        .rev()
                        .map(|b| match b {
                            b'A' => 'T',
                            b'C' => 'G',
                            b'G' => 'C',
                            _ => 'A',
                        })
                        .collect();
                    u.sequence.clone().min(rc)
                })
                .collect();
            out.sort();
            out
        };

        assert_eq!(
            canonical_strings(collect_unitigs(&forward, &cfg)),
            canonical_strings(collect_unitigs(&reverse, &cfg))
        );
    }

    #[test]
    fn test_threshold_cuts_weak_links() {
        // AACCGG counted once leaves AAC and ACC at count 1; with
        // threshold 1 only the doubled CCG/CGG entry survives, so the
        // full-length AACCGGTT path shrinks to its surviving core
        let table = table_from_reads(3, &["AACCGG"]);
        let cfg = TraversalConfig {
            frequency_threshold: 1,
            min_length: 4,
            workers: 2,
        };
        let unitigs = collect_unitigs(&table, &cfg);
        assert_eq!(unitigs.len(), 1);
        assert_eq!(unitigs[0].sequence, "CCGG");
        assert_eq!(unitigs[0].sum_weight, 4);

        // raising the length floor past the surviving core drops it
        let strict = TraversalConfig {
            frequency_threshold: 1,
            min_length: 5,
            workers: 2,
        };
        assert!(collect_unitigs(&table, &strict).is_empty());
    }

    #[test]
    fn test_banned_branch_is_not_traversed() {
        let table = table_from_reads(3, &["ACGTA", "ACGTC"]);
        ban_branching_kmers(&table, 0);
        let unitigs = collect_unitigs(&table, &config(5));
        // the branch node is banned and the surviving fragments are short
        assert!(unitigs.is_empty());
    }

    #[test]
    fn test_deterministic_across_worker_counts() {
        let reads = ["AATTCCTTGGAACCAA", "GGAACCAATTGGAATT"];
        let baseline = {
            let table = table_from_reads(5, &reads);
            let mut cfg = config(6);
            cfg.workers = 1;
            collect_unitigs(&table, &cfg)
        };
        for workers in [2, 4, 8] {
            let table = table_from_reads(5, &reads);
            let mut cfg = config(6);
            cfg.workers = workers;
            assert_eq!(collect_unitigs(&table, &cfg), baseline);
        }
    }

    #[test]
    fn test_sink_error_stops_traversal() {
        let table = table_from_reads(3, &["AACCGG"]);
        let result = emit_unitigs(&table, &config(4), |_| {
            Err(anyhow::anyhow!("writer failed"))
        });
        assert!(result.is_err());
    }
}
