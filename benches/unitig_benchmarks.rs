// Criterion benchmarks for the hot paths: k-mer extraction, sharded
// insertion, and the full counting + traversal flow.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use meta_weave::core::kmer::CanonicalKmers;
use meta_weave::core::sharded_map::ShardedKmerMap;
use meta_weave::counting::pipeline::{scatter_reads, CountingConfig, InsertMode};
use meta_weave::graph::unitigs::{emit_unitigs, TraversalConfig};

/// Generate synthetic reads for benchmarking
fn generate_synthetic_reads(count: usize, length: usize, seed: u64) -> Vec<String> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(seed);
    let bases = b"ACGT";

    (0..count)
        .map(|_| {
            (0..length)
                .map(|_| bases[rng.gen_range(0..4)] as char)
                .collect()
        })
        .collect()
}

fn bench_kmer_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("kmer_extraction");
    let reads = generate_synthetic_reads(1000, 150, 42);

    for k in [15usize, 21, 31] {
        group.throughput(Throughput::Bytes((reads.len() * 150) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(k), &k, |b, &k| {
            b.iter(|| {
                let mut total = 0u64;
                for read in &reads {
                    for kmer in CanonicalKmers::new(read.as_bytes(), k) {
                        total ^= black_box(kmer);
                    }
                }
                total
            });
        });
    }
    group.finish();
}

fn bench_sharded_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("sharded_insert");
    group.sample_size(20);

    for read_count in [1000usize, 5000] {
        let reads = generate_synthetic_reads(read_count, 150, 7);
        group.throughput(Throughput::Elements(read_count as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(read_count),
            &reads,
            |b, reads| {
                b.iter(|| {
                    let table = ShardedKmerMap::new(21, 1 << 26, 4);
                    let input: Vec<anyhow::Result<String>> =
                        reads.iter().map(|r| Ok(r.clone())).collect();
                    scatter_reads(
                        &table,
                        input,
                        &CountingConfig::with_workers(4),
                        InsertMode::Accumulate,
                    )
                    .unwrap();
                    black_box(table.size())
                });
            },
        );
    }
    group.finish();
}

fn bench_traversal(c: &mut Criterion) {
    let mut group = c.benchmark_group("unitig_traversal");
    group.sample_size(20);

    // overlapping windows of one synthetic genome give long simple paths
    let genome = generate_synthetic_reads(1, 20_000, 11).pop().unwrap();
    let reads: Vec<String> = genome
        .as_bytes()
        .windows(100)
        .step_by(20)
        .map(|w| String::from_utf8(w.to_vec()).unwrap())
        .collect();

    let table = ShardedKmerMap::new(21, 1 << 26, 4);
    let input: Vec<anyhow::Result<String>> = reads.iter().map(|r| Ok(r.clone())).collect();
    scatter_reads(
        &table,
        input,
        &CountingConfig::with_workers(4),
        InsertMode::Accumulate,
    )
    .unwrap();

    group.bench_function("walk", |b| {
        b.iter(|| {
            let config = TraversalConfig {
                frequency_threshold: 0,
                min_length: 61,
                workers: 4,
            };
            let mut bases = 0usize;
            emit_unitigs(&table, &config, |u| {
                bases += u.len();
                Ok(())
            })
            .unwrap();
            black_box(bases)
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_kmer_extraction,
    bench_sharded_insert,
    bench_traversal
);
criterion_main!(benches);
