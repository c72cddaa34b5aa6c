//! De Bruijn neighbor probes and the branching-k-mer ban
//! =====================================================
//!
//! Edges are implicit: a base `b` is a right neighbor of `x` when the
//! canonical form of `shift_right(x, b)` sits in the frequency table with
//! a count above the threshold. Banned entries carry a negative marker and
//! therefore fail every `> threshold` probe, which cuts branches without
//! removing keys.

use rayon::prelude::*;
use tracing::info;

use crate::core::kmer::{shift_left, shift_right};
use crate::core::sharded_map::{ShardedKmerMap, BAN_MARKER};

/// Number of right extensions of `x` present above `threshold`.
pub fn right_degree(table: &ShardedKmerMap, k: usize, threshold: u32, x: u64) -> u32 {
    let mut degree = 0;
    for base in 0..4u8 {
        if table.get(shift_right(x, k, base)) > threshold as i64 {
            degree += 1;
        }
    }
    degree
}

/// Number of left extensions of `x` present above `threshold`.
pub fn left_degree(table: &ShardedKmerMap, k: usize, threshold: u32, x: u64) -> u32 {
    let mut degree = 0;
    for base in 0..4u8 {
        if table.get(shift_left(x, k, base)) > threshold as i64 {
            degree += 1;
        }
    }
    degree
}

/// The unique right-extension base of `x`, or `None` on a dead end or
/// branch.
pub fn unique_right(table: &ShardedKmerMap, k: usize, threshold: u32, x: u64) -> Option<u8> {
    let mut found = None;
    for base in 0..4u8 {
        if table.get(shift_right(x, k, base)) > threshold as i64 {
            if found.is_some() {
                return None;
            }
            found = Some(base);
        }
    }
    found
}

/// The unique left-extension base of `x`, or `None` on a dead end or
/// branch.
pub fn unique_left(table: &ShardedKmerMap, k: usize, threshold: u32, x: u64) -> Option<u8> {
    let mut found = None;
    for base in 0..4u8 {
        if table.get(shift_left(x, k, base)) > threshold as i64 {
            if found.is_some() {
                return None;
            }
            found = Some(base);
        }
    }
    found
}

/// Marks every k-mer with two or more left or right neighbors by
/// overwriting its count with the ban marker. Returns the number of newly
/// banned entries.
///
/// Checking the stored (canonical) orientation covers both directions of
/// the graph node, since the left degree of a k-mer equals the right
/// degree of its reverse complement.
///
/// The pass is two-phase: every shard is scanned against the pristine
/// counts first, then the markers are written. Re-running it leaves the
/// table unchanged.
pub fn ban_branching_kmers(table: &ShardedKmerMap, threshold: u32) -> u64 {
    let k = table.k();

    let banned: Vec<Vec<u64>> = (0..table.shard_count())
        .into_par_iter()
        .map(|shard| {
            table
                .shard_entries(shard)
                .into_iter()
                .filter(|&(_, value)| value > threshold as i64)
                .filter(|&(key, _)| {
                    right_degree(table, k, threshold, key) >= 2
                        || left_degree(table, k, threshold, key) >= 2
                })
                .map(|(key, _)| key)
                .collect()
        })
        .collect();

    banned.par_iter().for_each(|keys| {
        for &key in keys {
            // keys come straight from the table, so the shard cannot be full
            table
                .set(key, BAN_MARKER)
                .expect("banning an existing key never grows a shard");
        }
    });

    let total: u64 = banned.iter().map(|v| v.len() as u64).sum();
    info!("banned {total} branching k-mers");
    total
}

/// A start k-mer for unitig traversal: it extends uniquely to the right
/// and has no unique left extension.
pub fn is_left_end(table: &ShardedKmerMap, k: usize, threshold: u32, x: u64) -> bool {
    unique_left(table, k, threshold, x).is_none()
        && unique_right(table, k, threshold, x).is_some()
}
