//! Frequency histogram and erroneous-k-mer threshold selection.
//!
//! The histogram buckets distinct k-mers by occurrence count; the selected
//! threshold separates the low-frequency error peak from real k-mers.
//! K-mers with count at or below the threshold are discarded downstream.

use tracing::debug;

use crate::core::sharded_map::ShardedKmerMap;
use crate::error::PipelineError;

/// Histogram length; the last bucket saturates.
pub const STAT_LEN: usize = 1024;

/// Occurrence-count histogram over a populated frequency table.
#[derive(Debug, Clone)]
pub struct FrequencyHistogram {
    /// `counts[i]` is the number of distinct k-mers occurring exactly `i`
    /// times (last bucket holds everything at or above `STAT_LEN - 1`).
    pub counts: Vec<u64>,
    /// Total k-mer occurrences (sum of table values).
    pub total_kmers: u64,
    /// Distinct k-mers observed.
    pub distinct_kmers: u64,
}

impl FrequencyHistogram {
    /// Builds the histogram in one pass over the table.
    pub fn from_table(table: &ShardedKmerMap) -> Self {
        let mut counts = vec![0u64; STAT_LEN];
        let mut total_kmers = 0u64;
        let mut distinct_kmers = 0u64;
        for (_, value) in table.entries() {
            if value <= 0 {
                continue;
            }
            total_kmers += value as u64;
            distinct_kmers += 1;
            let bucket = (value as usize).min(STAT_LEN - 1);
            counts[bucket] += 1;
        }
        Self {
            counts,
            total_kmers,
            distinct_kmers,
        }
    }
}

/// How the erroneous/real cutoff is chosen. The absolute and
/// bottom-percent modes are mutually exclusive inputs; auto is the default
/// when neither is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdMode {
    /// Use the supplied cutoff directly.
    Absolute(u32),
    /// Cut the given percent of total k-mer occurrences from the bottom of
    /// the frequency distribution.
    BottomPercent(u32),
    /// Walk down the error peak until the distribution stops falling,
    /// capped at half of the distinct k-mers.
    Auto,
}

/// Picks the highest count treated as erroneous.
pub fn select_threshold(
    histogram: &FrequencyHistogram,
    mode: ThresholdMode,
) -> Result<u32, PipelineError> {
    let threshold = match mode {
        ThresholdMode::Absolute(t) => t,
        ThresholdMode::BottomPercent(percent) => {
            if percent > 100 {
                return Err(PipelineError::InvalidInput(format!(
                    "bottom-cut percent {percent} outside 0..=100"
                )));
            }
            bottom_percent_threshold(&histogram.counts, histogram.total_kmers, percent)
        }
        ThresholdMode::Auto => auto_threshold(&histogram.counts, histogram.distinct_kmers),
    };
    debug!("maximal bad frequency = {threshold}");
    Ok(threshold)
}

/// Accumulates `i * h[i]` for i = 1, 2, ... until the running sum reaches
/// the requested share of total occurrences; that i is the cutoff.
fn bottom_percent_threshold(counts: &[u64], total_kmers: u64, percent: u32) -> u32 {
    let kmers_to_cut = total_kmers * percent as u64 / 100;
    if kmers_to_cut == 0 {
        return 0;
    }
    let mut accumulated = 0u64;
    for (i, &bucket) in counts.iter().enumerate().skip(1) {
        accumulated += i as u64 * bucket;
        if accumulated >= kmers_to_cut {
            return i as u32;
        }
    }
    (counts.len() - 1) as u32
}

/// Locates the valley between the error peak at low frequencies and the
/// true-k-mer peak: advance while the weighted histogram keeps falling,
/// stopping once half of the distinct k-mers lie at or below the cutoff.
fn auto_threshold(counts: &[u64], distinct_kmers: u64) -> u32 {
    let mut threshold = 1usize;
    let mut cumulative = 0u64;
    while threshold + 1 < counts.len()
        && counts[threshold] * threshold as u64 > counts[threshold + 1] * (threshold as u64 + 1)
    {
        cumulative += counts[threshold];
        if cumulative * 2 > distinct_kmers {
            debug!("threshold search stopped at 50% of distinct k-mers");
            break;
        }
        threshold += 1;
    }
    threshold as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counting::pipeline::{scatter_reads, CountingConfig, InsertMode};

    fn histogram(buckets: &[u64]) -> FrequencyHistogram {
        let mut counts = vec![0u64; STAT_LEN];
        counts[..buckets.len()].copy_from_slice(buckets);
        let total: u64 = buckets.iter().enumerate().map(|(i, &c)| i as u64 * c).sum();
        let distinct: u64 = buckets.iter().skip(1).sum();
        FrequencyHistogram {
            counts,
            total_kmers: total,
            distinct_kmers: distinct,
        }
    }

    #[test]
    fn test_absolute_mode_passes_through() {
        let h = histogram(&[0, 10, 5]);
        assert_eq!(select_threshold(&h, ThresholdMode::Absolute(3)).unwrap(), 3);
    }

    #[test]
    fn test_bottom_percent_walk() {
        // total = 1*100 + 2*20 + 3*5 + 4*1 = 159; 70% => cut 111
        // accumulation: i=1 -> 100, i=2 -> 140 >= 111 => threshold 2
        let h = histogram(&[0, 100, 20, 5, 1]);
        assert_eq!(h.total_kmers, 159);
        assert_eq!(
            select_threshold(&h, ThresholdMode::BottomPercent(70)).unwrap(),
            2
        );
    }

    #[test]
    fn test_bottom_percent_zero_cuts_nothing() {
        let h = histogram(&[0, 100, 20]);
        assert_eq!(
            select_threshold(&h, ThresholdMode::BottomPercent(0)).unwrap(),
            0
        );
    }

    #[test]
    fn test_bottom_percent_rejects_over_100() {
        let h = histogram(&[0, 1]);
        assert!(select_threshold(&h, ThresholdMode::BottomPercent(101)).is_err());
    }

    #[test]
    fn test_auto_walks_down_the_error_peak() {
        // weighted histogram falls 100 > 80 > 60 > 40 and rises to 100 at
        // i=5; a heavy far bucket keeps the 50% guard from firing
        let h = histogram(&[0, 100, 40, 20, 10, 20, 0, 0, 0, 0, 1000]);
        assert_eq!(select_threshold(&h, ThresholdMode::Auto).unwrap(), 4);
    }

    #[test]
    fn test_auto_stops_at_half_of_distinct() {
        // the walk would continue, but bucket 1 already holds most k-mers
        let h = histogram(&[0, 1000, 10, 1]);
        assert_eq!(select_threshold(&h, ThresholdMode::Auto).unwrap(), 1);
    }

    #[test]
    fn test_auto_on_flat_distribution() {
        let h = histogram(&[0, 5, 5]);
        // 1*5 > 2*5 is false immediately
        assert_eq!(select_threshold(&h, ThresholdMode::Auto).unwrap(), 1);
    }

    #[test]
    fn test_histogram_from_table() {
        let table = ShardedKmerMap::new(3, 1 << 20, 2);
        let reads: Vec<anyhow::Result<String>> =
            vec![Ok("ACGTAC".to_string()), Ok("ACGTAC".to_string())];
        scatter_reads(
            &table,
            reads,
            &CountingConfig::with_workers(2),
            InsertMode::Accumulate,
        )
        .unwrap();
        let h = FrequencyHistogram::from_table(&table);
        // two canonical entries, each seen 4 times
        assert_eq!(h.distinct_kmers, 2);
        assert_eq!(h.total_kmers, 8);
        assert_eq!(h.counts[4], 2);
    }
}
