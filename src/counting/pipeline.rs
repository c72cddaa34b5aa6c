//! Read-to-k-mer counting pipeline
//! ===============================
//!
//! Producer/worker wiring that feeds canonical k-mers from a stream of DNA
//! sequences into a shared [`ShardedKmerMap`]. The producer batches reads
//! and blocks on a bounded queue (backpressure); workers drain batches and
//! insert. On the first worker error the stop flag is raised, the producer
//! quits enqueueing, workers drain the queue, and the aggregated error is
//! surfaced at join.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::kmer::CanonicalKmers;
use crate::core::sharded_map::ShardedKmerMap;
use crate::error::PipelineError;

/// Reads handed to one worker at a time; matches the load-task granularity
/// the counting pass was tuned with.
pub const DEFAULT_BATCH_SIZE: usize = 1 << 15;

/// How new k-mers are treated during insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Insert unseen canonical k-mers and accumulate counts.
    Accumulate,
    /// Only bump k-mers already present; unseen k-mers are ignored.
    /// Used when projecting a sample onto a pre-seeded table.
    PresenceOnly,
}

#[derive(Debug, Clone)]
pub struct CountingConfig {
    pub workers: usize,
    pub batch_size: usize,
    /// Pending batches the producer may run ahead; producers block when the
    /// queue is full.
    pub queue_capacity: usize,
    /// Shared cooperative-stop flag, checked between batches. Raising it
    /// aborts the pass with `Cancelled`.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl CountingConfig {
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: workers * 2,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// What a counting pass processed.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingSummary {
    pub reads: u64,
    pub kmers: u64,
    /// Unreadable records that were logged and skipped.
    pub skipped_records: u64,
}

/// Streams `reads` through a worker pool into `table`.
///
/// Each item is a DNA string from an upstream decoder; `Err` items count
/// as recoverable record failures and are skipped. Reads shorter than the
/// table's k contribute nothing; windows spanning a non-ACGT base are
/// dropped and extraction resumes at the next valid stretch.
pub fn scatter_reads<I>(
    table: &ShardedKmerMap,
    reads: I,
    config: &CountingConfig,
    mode: InsertMode,
) -> Result<CountingSummary>
where
    I: IntoIterator<Item = Result<String>>,
{
    let k = table.k();
    let (batch_tx, batch_rx) = bounded::<Vec<String>>(config.queue_capacity.max(1));
    let stop = AtomicBool::new(false);
    let first_error: Mutex<Option<anyhow::Error>> = Mutex::new(None);
    let kmers_inserted = AtomicU64::new(0);

    let mut reads_sent = 0u64;
    let mut skipped = 0u64;

    std::thread::scope(|scope| {
        for _ in 0..config.workers.max(1) {
            let batch_rx = batch_rx.clone();
            let stop = &stop;
            let first_error = &first_error;
            let kmers_inserted = &kmers_inserted;
            scope.spawn(move || {
                let mut local_kmers = 0u64;
                while let Ok(batch) = batch_rx.recv() {
                    if stop.load(Ordering::Relaxed) {
                        // keep draining so the producer never blocks forever
                        continue;
                    }
                    for read in &batch {
                        if let Err(e) = insert_read(table, read, k, mode, &mut local_kmers) {
                            let mut slot = first_error.lock();
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            stop.store(true, Ordering::Relaxed);
                            break;
                        }
                    }
                }
                kmers_inserted.fetch_add(local_kmers, Ordering::Relaxed);
            });
        }
        drop(batch_rx);

        let mut batch = Vec::with_capacity(config.batch_size);
        for item in reads {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            if let Some(cancel) = &config.cancel {
                if cancel.load(Ordering::Relaxed) {
                    let mut slot = first_error.lock();
                    if slot.is_none() {
                        *slot = Some(PipelineError::Cancelled.into());
                    }
                    stop.store(true, Ordering::Relaxed);
                    break;
                }
            }
            match item {
                Ok(read) => {
                    batch.push(read);
                    reads_sent += 1;
                    if batch.len() >= config.batch_size {
                        let full = std::mem::replace(
                            &mut batch,
                            Vec::with_capacity(config.batch_size),
                        );
                        if batch_tx.send(full).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!("skipping unreadable record: {e:#}");
                    skipped += 1;
                }
            }
        }
        if !batch.is_empty() && !stop.load(Ordering::Relaxed) {
            let _ = batch_tx.send(batch);
        }
        drop(batch_tx);
    });

    if let Some(e) = first_error.lock().take() {
        return Err(e);
    }

    let summary = CountingSummary {
        reads: reads_sent,
        kmers: kmers_inserted.load(Ordering::Relaxed),
        skipped_records: skipped,
    };
    debug!(
        "counting pass done: {} reads, {} k-mer insertions, {} skipped records",
        summary.reads, summary.kmers, summary.skipped_records
    );
    Ok(summary)
}

fn insert_read(
    table: &ShardedKmerMap,
    read: &str,
    k: usize,
    mode: InsertMode,
    inserted: &mut u64,
) -> Result<()> {
    for kmer in CanonicalKmers::new(read.as_bytes(), k) {
        match mode {
            InsertMode::Accumulate => table.increment(kmer)?,
            InsertMode::PresenceOnly => {
                table.add_if_present(kmer, 1);
            }
        }
        *inserted += 1;
    }
    Ok(())
}
