//! Criterion benchmarks for `fdmc-math`.
//!
//! Focus on pure numerical kernels that show up in the solver's objective.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fdmc_math::{kl_divergence_log, log_softmax, log_sum_exp};

fn bench_softmax_kernels(c: &mut Criterion) {
    let mut group = c.benchmark_group("softmax");

    for n in [2usize, 4, 16, 64] {
        let logits: Vec<f64> = (0..n).map(|i| (i as f64 * 0.37).sin() * 5.0).collect();
        let mut target = vec![0.0; n];
        target[n / 2] = 1.0;

        group.bench_with_input(BenchmarkId::new("log_sum_exp", n), &logits, |b, z| {
            b.iter(|| black_box(log_sum_exp(black_box(z))));
        });

        group.bench_with_input(BenchmarkId::new("kl_one_hot", n), &logits, |b, z| {
            b.iter(|| {
                let lq = log_softmax(black_box(z));
                black_box(kl_divergence_log(black_box(&target), &lq))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_softmax_kernels);
criterion_main!(benches);
