use criterion::{black_box, criterion_group, criterion_main, Criterion};

use hdrange::Histogram;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// A random `u64` whose bit length is itself uniformly distributed, so values land
/// in every bucket of the histogram rather than piling up in the topmost ones.
fn random_scattered_u64<R: Rng>(rng: &mut R) -> u64 {
    let bit_length: u32 = rng.gen_range(0..65);

    match bit_length {
        0 => 0,
        64 => u64::max_value(),
        x => rng.gen_range(0..1_u64 << x),
    }
}

fn precalc_values(n: usize) -> Vec<u64> {
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    (0..n).map(|_| random_scattered_u64(&mut rng).max(1)).collect()
}

fn record_random_values(c: &mut Criterion) {
    let values = precalc_values(1_000_000);

    c.bench_function("record_precalc_random_values_u64", |b| {
        let mut h = Histogram::<u64>::new_with_bounds(1, u64::max_value(), 3).unwrap();
        b.iter(|| {
            for v in &values {
                // u64 counts, won't overflow
                h.record(*v).unwrap();
            }
        })
    });

    c.bench_function("saturating_record_precalc_random_values_u64", |b| {
        let mut h = Histogram::<u64>::new_with_bounds(1, 1 << 40, 3).unwrap();
        b.iter(|| {
            for v in &values {
                h.saturating_record(*v);
            }
        })
    });

    c.bench_function("record_random_values_u64_resize", |b| {
        b.iter(|| {
            let mut h = Histogram::<u64>::new(3).unwrap();
            for v in &values[..10_000] {
                h.record(*v).unwrap();
            }
            h
        })
    });
}

fn record_correct(c: &mut Criterion) {
    let values = precalc_values(10_000);

    c.bench_function("record_correct_precalc_random_values_u64", |b| {
        let mut h = Histogram::<u64>::new_with_bounds(1, u64::max_value(), 3).unwrap();
        b.iter(|| {
            for v in &values {
                h.record_correct(*v, 1 << 40).unwrap();
            }
        })
    });
}

fn query_quantiles(c: &mut Criterion) {
    let mut h = Histogram::<u64>::new_with_bounds(1, u64::max_value(), 3).unwrap();
    for v in precalc_values(1_000_000) {
        h.record(v).unwrap();
    }

    c.bench_function("value_at_quantile", |b| {
        b.iter(|| {
            for q in &[0.1_f64, 0.5, 0.9, 0.99, 0.999, 1.0] {
                black_box(h.value_at_quantile(*q));
            }
        })
    });

    c.bench_function("iter_quantiles_ticks_per_half_5", |b| {
        b.iter(|| h.iter_quantiles(5).map(|v| v.value_iterated_to()).sum::<u64>())
    });

    c.bench_function("iter_recorded", |b| {
        b.iter(|| {
            h.iter_recorded()
                .map(|v| v.count_since_last_iteration())
                .sum::<u64>()
        })
    });
}

fn merge(c: &mut Criterion) {
    let mut h1 = Histogram::<u64>::new_with_bounds(1, u64::max_value(), 3).unwrap();
    let mut h2 = Histogram::<u64>::new_with_bounds(1, u64::max_value(), 3).unwrap();
    let values = precalc_values(200_000);
    for v in &values[..100_000] {
        h1.record(*v).unwrap();
    }
    for v in &values[100_000..] {
        h2.record(*v).unwrap();
    }

    c.bench_function("add_same_dimensions", |b| {
        b.iter(|| {
            let mut target = h1.clone();
            target.add(&h2).unwrap();
            target
        })
    });

    let mut narrow = Histogram::<u64>::new_with_bounds(1, 1 << 32, 2).unwrap();
    narrow.auto(true);
    for v in &values[..100_000] {
        narrow.saturating_record(*v);
    }

    // differing geometries force the re-encoding slow path
    c.bench_function("add_differing_dimensions", |b| {
        b.iter(|| {
            let mut target = narrow.clone();
            target.add(&h2).unwrap();
            target
        })
    });
}

criterion_group!(benches, record_random_values, record_correct, query_quantiles, merge);
criterion_main!(benches);
