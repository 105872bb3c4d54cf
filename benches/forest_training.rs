use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use railcast::ml::{ForestOptions, GbdtOptions, TrainDataset, train_gbdt, train_random_forest};
use rand::{Rng, SeedableRng, rngs::StdRng};

const ROWS: usize = 2_000;
const FEATURES: usize = 11;

fn synthetic_dataset() -> TrainDataset {
    let mut rng = StdRng::seed_from_u64(7);
    let mut x = Vec::with_capacity(ROWS);
    let mut y = Vec::with_capacity(ROWS);
    for _ in 0..ROWS {
        let row: Vec<f32> = (0..FEATURES).map(|_| rng.random_range(0.0..1.0)).collect();
        let severity = row[2] + row[4] + row[5];
        y.push(match severity {
            s if s > 2.1 => 2,
            s if s > 1.6 => 1,
            _ => 0,
        });
        x.push(row);
    }
    TrainDataset {
        feature_names: (0..FEATURES).map(|idx| format!("f{idx}")).collect(),
        classes: vec!["normal".into(), "delayed".into(), "suspended".into()],
        x,
        y,
    }
}

fn bench_forest(c: &mut Criterion) {
    let data = synthetic_dataset();
    let options = ForestOptions {
        n_estimators: 20,
        ..ForestOptions::classifier()
    };
    c.bench_with_input(
        BenchmarkId::new("random_forest", ROWS),
        &data,
        |b, data| {
            b.iter(|| train_random_forest(black_box(data), &options).expect("train forest"));
        },
    );
}

fn bench_boosting(c: &mut Criterion) {
    let data = synthetic_dataset();
    let options = GbdtOptions {
        rounds: 20,
        ..GbdtOptions::default()
    };
    c.bench_with_input(
        BenchmarkId::new("gradient_boosting", ROWS),
        &data,
        |b, data| {
            b.iter(|| train_gbdt(black_box(data), &options).expect("train gbdt"));
        },
    );
}

criterion_group!(benches, bench_forest, bench_boosting);
criterion_main!(benches);
