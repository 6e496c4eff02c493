//! Benchmarks for the core complex operations
//!
//! 1. **Tag compression**: delta encoding and decoding against a ground tag
//! 2. **Edits**: `insert_tet` into an empty complex, 1-4 refinement and undo
//! 3. **Queries**: `adjacencies` with and without the link cache
//! 4. **Iteration**: deduplicated and raw tetrahedron iteration
//! 5. **Vertex pool**: bulk loading in z-order

#![allow(missing_docs)] // Criterion macros generate undocumented functions

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use std::sync::OnceLock;
use tetstar::core::tag::{COMPRESSED_TAG_LENGTH, compress, decompress};
use tetstar::prelude::*;

/// Get the deterministic seed for random input generation.
/// Reads `TETSTAR_BENCH_SEED` (decimal or 0x-hex). Defaults to 0x7E75.
fn get_benchmark_seed() -> u64 {
    static SEED: OnceLock<u64> = OnceLock::new();
    *SEED.get_or_init(|| {
        let seed = std::env::var("TETSTAR_BENCH_SEED")
            .ok()
            .and_then(|s| {
                let s = s.trim();
                s.strip_prefix("0x")
                    .or_else(|| s.strip_prefix("0X"))
                    .map_or_else(|| s.parse().ok(), |hex| u64::from_str_radix(hex, 16).ok())
            })
            .unwrap_or(0x7E75);
        if std::env::var("PRINT_BENCH_SEED").is_ok() {
            eprintln!("Benchmark seed: 0x{seed:X} ({seed})");
        }
        seed
    })
}

/// A closed tetrahedron `(1, 2, 3, 4)` refined by `splits` random 1-4 flips.
fn refined_complex(splits: u64, seed: u64, config: ComplexConfig) -> TetComplex {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut complex = TetComplex::with_config(TagBlocks, config);
    complex.insert_tet(1, 2, 3, 4).unwrap();
    for [x, y, z] in [[1, 3, 2], [1, 2, 4], [1, 4, 3], [2, 3, 4]] {
        complex.insert_tet(x, y, z, GHOST_VERTEX).unwrap();
    }
    let mut solid: Vec<Tetrahedron> = vec![[1, 2, 3, 4]];
    for v in 5..5 + splits {
        let [a, b, c, d] = solid.swap_remove(rng.random_range(0..solid.len()));
        complex.flip_14(a, b, c, d, v).unwrap();
        solid.extend([[v, b, c, d], [a, v, c, d], [a, b, v, d], [a, b, c, v]]);
    }
    complex
}

fn random_points(n: usize, seed: u64) -> Vec<Point3> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            [
                rng.random_range(-100.0..100.0),
                rng.random_range(-100.0..100.0),
                rng.random_range(-100.0..100.0),
            ]
        })
        .collect()
}

fn benchmark_tag_compression(c: &mut Criterion) {
    let seed = get_benchmark_seed();
    let mut rng = StdRng::seed_from_u64(seed);
    let ground: Tag = 1 << 20;
    let near: Vec<Tag> = (0..1024).map(|_| ground + rng.random_range(1..4096)).collect();
    let far: Vec<Tag> = (0..1024).map(|_| rng.random::<u64>() >> 2).collect();

    let mut group = c.benchmark_group("tag_compression");
    group.throughput(Throughput::Elements(1024));
    for (name, tags) in [("near", &near), ("far", &far)] {
        group.bench_with_input(BenchmarkId::new("compress", name), tags, |b, tags| {
            b.iter(|| {
                let mut atoms = [0u8; COMPRESSED_TAG_LENGTH];
                let mut total = 0;
                for &tag in tags {
                    total += compress(ground, black_box(tag), &mut atoms);
                }
                black_box(total)
            });
        });

        let mut stream = Vec::new();
        for &tag in tags {
            let mut atoms = [0u8; COMPRESSED_TAG_LENGTH];
            let len = compress(ground, tag, &mut atoms);
            stream.extend_from_slice(&atoms[..len]);
        }
        group.bench_with_input(BenchmarkId::new("decompress", name), &stream, |b, stream| {
            b.iter(|| {
                let mut rest = stream.as_slice();
                let mut count = 0u32;
                while let Some((tag, used)) = decompress(ground, rest) {
                    black_box(tag);
                    rest = &rest[used..];
                    count += 1;
                }
                count
            });
        });
    }
    group.finish();
}

fn benchmark_edits(c: &mut Criterion) {
    let seed = get_benchmark_seed();
    let mut group = c.benchmark_group("edits");

    group.bench_function("insert_tet_empty", |b| {
        b.iter_batched(
            TetComplex::default,
            |mut complex| {
                complex.insert_tet(2, 4, 6, 8).unwrap();
                black_box(complex)
            },
            BatchSize::SmallInput,
        );
    });

    for &splits in &[100_u64, 1_000, 5_000] {
        group.throughput(Throughput::Elements(splits));
        group.bench_with_input(BenchmarkId::new("flip_14_refine", splits), &splits, |b, &splits| {
            b.iter(|| black_box(refined_complex(splits, seed, ComplexConfig::fast())));
        });
    }

    group.bench_function("flip_14_then_41", |b| {
        b.iter_batched(
            || refined_complex(1_000, seed, ComplexConfig::fast()),
            |mut complex| {
                let [a, b2, c2, d] = complex.iter_solid().next().unwrap();
                complex.flip_14(a, b2, c2, d, 1 << 30).unwrap();
                complex.flip_41(a, b2, c2, d, 1 << 30).unwrap();
                black_box(complex)
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

fn benchmark_queries(c: &mut Criterion) {
    let seed = get_benchmark_seed();
    let mut group = c.benchmark_group("adjacencies");
    for (name, config) in [
        ("cached", ComplexConfig::fast()),
        ("uncached", config_presets::uncached()),
    ] {
        let mut complex = refined_complex(2_000, seed, config);
        let faces: Vec<[Tag; 3]> = complex.iter_solid().map(|[a, b, c, _]| [a, b, c]).collect();
        group.throughput(Throughput::Elements(faces.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| {
                for &[x, y, z] in &faces {
                    black_box(complex.adjacencies(x, y, z));
                }
            });
        });
    }
    group.finish();
}

fn benchmark_iteration(c: &mut Criterion) {
    let seed = get_benchmark_seed();
    let complex = refined_complex(5_000, seed, ComplexConfig::fast());
    let mut group = c.benchmark_group("iteration");
    group.throughput(Throughput::Elements(complex.tet_count() + complex.ghost_tet_count()));
    group.bench_function("iter", |b| b.iter(|| black_box(complex.iter().count())));
    group.bench_function("iter_all", |b| b.iter(|| black_box(complex.iter_all().count())));
    group.bench_function("iter_solid", |b| b.iter(|| black_box(complex.iter_solid().count())));
    group.finish();
}

fn benchmark_vertex_pool(c: &mut Criterion) {
    let seed = get_benchmark_seed();
    let mut group = c.benchmark_group("vertex_pool");
    for &n in &[1_000_usize, 10_000, 100_000] {
        let points = random_points(n, seed);
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("from_points", n), &points, |b, points| {
            b.iter(|| black_box(VertexPool::from_points(points)));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_tag_compression,
    benchmark_edits,
    benchmark_queries,
    benchmark_iteration,
    benchmark_vertex_pool
);
criterion_main!(benches);
