use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kolosal_trainer::config::{FitOptions, TrainerConfig};
use kolosal_trainer::data::TimeSeriesFrame;
use kolosal_trainer::storage::InMemoryArtifactStore;
use kolosal_trainer::trainer::Trainer;
use kolosal_trainer::tuning::ModelSpec;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::sync::Arc;

fn create_frame(n_items: usize, length: usize) -> TimeSeriesFrame {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
    (0..n_items).fold(TimeSeriesFrame::new(), |frame, item| {
        let values: Vec<f64> = (0..length)
            .map(|t| 10.0 + (t % 7) as f64 + 0.05 * t as f64 + rng.gen::<f64>())
            .collect();
        frame.with_series(format!("item_{}", item), values)
    })
}

fn specs() -> Vec<ModelSpec> {
    vec![
        ModelSpec::new("Naive"),
        ModelSpec::new("SeasonalNaive").with_param("season_length", 7),
        ModelSpec::new("Average").with_param("window", 14),
        ModelSpec::new("SimpleExponentialSmoothing"),
    ]
}

fn new_trainer() -> Trainer {
    let config = TrainerConfig::new()
        .with_prediction_length(7)
        .with_num_val_windows(2)
        .with_verbosity(0);
    Trainer::new("/bench/run", config)
        .unwrap()
        .with_store(Arc::new(InMemoryArtifactStore::new()))
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    group.sample_size(10);

    for n_items in [10, 100, 500].iter() {
        let frame = create_frame(*n_items, 120);

        group.bench_with_input(BenchmarkId::new("baselines", n_items), &frame, |b, frame| {
            b.iter(|| {
                let mut trainer = new_trainer();
                trainer
                    .fit(black_box(frame), &specs(), None, FitOptions::new())
                    .unwrap()
            })
        });
    }

    group.finish();
}

fn bench_predict(c: &mut Criterion) {
    let mut group = c.benchmark_group("predict");

    let frame = create_frame(100, 120);
    let mut trainer = new_trainer();
    trainer.fit(&frame, &specs(), None, FitOptions::new()).unwrap();

    group.bench_function("best_model", |b| {
        b.iter(|| trainer.predict(black_box(&frame), None, None).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_fit, bench_predict);
criterion_main!(benches);
