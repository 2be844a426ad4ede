//! Benchmarks for the PHY kernels
//!
//! Run with: cargo bench -p r4w-phy --bench llr_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use r4w_phy::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_layer(rng: &mut StdRng) -> LayerBatch {
    let mut layer = LayerBatch::default();
    for i in 0..LANES {
        layer.tx[i] = ComplexI16::new(rng.gen_range(-12000..12000), rng.gen_range(-12000..12000));
        layer.beta.0[i] = rng.gen_range(1000..7000);
        layer.post_sinr.0[i] = rng.gen_range(1024..8192);
    }
    layer
}

// ============================================================================
// Soft Demapping
// ============================================================================

fn bench_soft_demap(c: &mut Criterion) {
    let mut group = c.benchmark_group("soft_demap");
    let mut rng = StdRng::seed_from_u64(1);
    let layers = [random_layer(&mut rng), random_layer(&mut rng)];
    let mut out = vec![0i8; 512];

    for modulation in ModulationOrder::ALL {
        for n_layers in [1usize, 2] {
            let demapper = SoftDemapper::new(modulation, LlrScaling::default());
            group.throughput(Throughput::Elements((LANES * n_layers) as u64));
            let id = BenchmarkId::new(modulation.to_string(), format!("{}L", n_layers));
            group.bench_with_input(id, &n_layers, |b, &n| {
                b.iter(|| {
                    demapper
                        .demap(black_box(&layers[..n]), SubcarrierCount::Sc16, &mut out, 0)
                        .unwrap()
                })
            });
        }
    }

    group.finish();
}

fn bench_dmrs_demap(c: &mut Criterion) {
    let mut group = c.benchmark_group("dmrs_demap");
    let mut rng = StdRng::seed_from_u64(2);
    let layers = [random_layer(&mut rng)];
    let mut out = vec![0i8; 512];

    for (name, config) in [
        ("type1_cdm1", DmrsConfig::new(DmrsType::Type1, 1, 0).unwrap()),
        ("type2_cdm1", DmrsConfig::new(DmrsType::Type2, 1, 0).unwrap()),
        ("type2_cdm2", DmrsConfig::new(DmrsType::Type2, 2, 2).unwrap()),
    ] {
        let demapper = DmrsDemapper::new(ModulationOrder::Qam64, LlrScaling::default(), config);
        group.bench_function(name, |b| {
            b.iter(|| {
                demapper
                    .demap(black_box(&layers), SubcarrierCount::Sc16, BatchPhase::Sc4, &mut out, 0)
                    .unwrap()
            })
        });
    }

    group.finish();
}

// ============================================================================
// Cholesky Inverse
// ============================================================================

fn diagonally_dominant<const N: usize>() -> HermitianBatch<N> {
    let mut batch = HermitianBatch::<N>::identity();
    for lane in 0..LANES {
        for i in 0..N {
            batch.set(lane, i, i, num_complex::Complex32::new(N as f32, 0.0));
            for j in 0..i {
                let v = num_complex::Complex32::new(0.3, 0.1 * lane as f32 / LANES as f32);
                batch.set(lane, i, j, v);
                batch.set(lane, j, i, v.conj());
            }
        }
    }
    batch
}

fn bench_cholesky<const N: usize>(group: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    let inverse = CholeskyInverse::<N>::new(CholeskyOptions::default()).unwrap();
    let batch = diagonally_dominant::<N>();
    group.throughput(Throughput::Elements(LANES as u64));
    group.bench_function(BenchmarkId::from_parameter(N), |b| {
        b.iter(|| inverse.invert(black_box(&batch)).unwrap())
    });
}

fn bench_cholesky_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("cholesky_inverse");
    bench_cholesky::<2>(&mut group);
    bench_cholesky::<4>(&mut group);
    bench_cholesky::<8>(&mut group);
    bench_cholesky::<16>(&mut group);
    group.finish();
}

criterion_group!(benches, bench_soft_demap, bench_dmrs_demap, bench_cholesky_sizes);
criterion_main!(benches);
