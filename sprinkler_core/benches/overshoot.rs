use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use sprinkler_core::overshoot::OvershootModel;
use sprinkler_core::trend::TrendAnalyzer;

// Rates spread over both signs and past max_rate, xorshift for repeatability.
fn synth_rates(n: usize, max: i32, seed: u32) -> Vec<(i32, i32)> {
    let mut state = seed.max(1);
    let mut next = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        x
    };
    (0..n)
        .map(|_| {
            let rate = (next() % (4 * max as u32)) as i32 - 2 * max;
            let overshoot = (next() % 500) as i32;
            (rate, overshoot)
        })
        .collect()
}

pub fn bench_overshoot(c: &mut Criterion) {
    let mut g = c.benchmark_group("overshoot");
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p sprinkler_core --bench overshoot
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(1));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }

    let samples = synth_rates(10_000, 1000, 0xC0FFEE);

    for &buckets in &[10usize, 20, 50] {
        g.bench_function(format!("learn_{buckets}"), |b| {
            b.iter_batched(
                || OvershootModel::new(buckets, 1000),
                |mut m| {
                    for &(rate, ov) in &samples {
                        m.set_overshoot(black_box(rate), black_box(ov));
                    }
                    black_box(m);
                },
                BatchSize::SmallInput,
            )
        });

        // Sparse model: predictions scan far for a neighbour.
        let mut sparse = OvershootModel::new(buckets, 1000);
        sparse.set_overshoot(900, 120);
        sparse.set_overshoot(-900, 110);
        g.bench_function(format!("predict_sparse_{buckets}"), |b| {
            b.iter(|| {
                let mut acc = 0i64;
                for &(rate, _) in &samples {
                    acc += i64::from(sparse.predict(black_box(rate)));
                }
                black_box(acc)
            })
        });
    }
    g.finish();
}

pub fn bench_trend(c: &mut Criterion) {
    let mut g = c.benchmark_group("trend");
    let samples = synth_rates(10_000, 1000, 0xBEEF);
    for &window in &[8usize, 16, 64] {
        g.bench_function(format!("push_trend_{window}"), |b| {
            b.iter_batched(
                || TrendAnalyzer::new(window),
                |mut t| {
                    let mut acc = 0i64;
                    for &(p, _) in &samples {
                        t.push(black_box(p));
                        acc += i64::from(t.trend(window / 2));
                    }
                    black_box(acc)
                },
                BatchSize::SmallInput,
            )
        });
    }
    g.finish();
}

criterion_group!(models, bench_overshoot, bench_trend);
criterion_main!(models);
