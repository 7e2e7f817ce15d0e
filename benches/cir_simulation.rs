use std::hint::black_box;
use std::time::Duration;

use cir_rs::estimate;
use cir_rs::monte_carlo;
use cir_rs::simulate;
use cir_rs::CirParams;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;

fn bench_cir(c: &mut Criterion) {
  let params = CirParams::new(2.0, 20.0, 1.0);
  let mut group = c.benchmark_group("CIR");
  group.measurement_time(Duration::from_secs(3));
  group.warm_up_time(Duration::from_millis(500));

  for &n in &[252usize, 5_000usize] {
    group.bench_with_input(BenchmarkId::new("simulate", n), &n, |b, &n| {
      b.iter(|| black_box(simulate(params, 1.0 / 252.0, n, 20.0, 456)));
    });
  }

  for &m in &[40usize, 1_000usize] {
    group.bench_with_input(BenchmarkId::new("monte_carlo/504", m), &m, |b, &m| {
      b.iter(|| black_box(monte_carlo(params, 1.0 / 252.0, 504, 20.0, m, 7)));
    });
  }

  group.sample_size(10);
  for &n in &[1_000usize, 5_000usize] {
    let series = match simulate(params, 0.1, n, 20.0, 456) {
      Ok(path) => path.values.to_vec(),
      Err(e) => panic!("bench setup failed: {e}"),
    };
    group.bench_with_input(BenchmarkId::new("estimate", n), &series, |b, series| {
      b.iter(|| black_box(estimate(series, 0.1, CirParams::new(1.0, 15.0, 0.5))));
    });
  }

  group.finish();
}

criterion_group!(benches, bench_cir);
criterion_main!(benches);
