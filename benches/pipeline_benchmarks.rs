use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use turbine_telemetry::models::{
    next_window, preprocess, two_sigma_outliers, TelemetryRow, WindowAnchor, WindowSchedule,
};

fn batch_rows(size: usize) -> Vec<(u64, TelemetryRow)> {
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    (0..size)
        .map(|i| {
            let timestamp = start + ChronoDuration::minutes(i as i64);
            (
                i as u64 + 2,
                TelemetryRow {
                    turbine_id: (i % 10) as i32,
                    timestamp: timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                    wind_speed: (i % 30) as f64,
                    wind_direction: (i * 7 % 400) as i32,
                    power_output: 1500.0 + (i % 97) as f64,
                },
            )
        })
        .collect()
}

// Validation, filtering and per-turbine grouping of one batch file
fn preprocess_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocess");

    for size in [1_000, 10_000, 100_000].iter() {
        let rows = batch_rows(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &rows, |b, rows| {
            b.iter(|| black_box(preprocess(rows.clone())));
        });
    }

    group.finish();
}

// Anomaly classification over one window of readings
fn outlier_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("two_sigma_outliers");

    for size in [24, 1_440, 86_400].iter() {
        let values: Vec<f64> = (0..*size)
            .map(|i| if i % 500 == 0 { 9_000.0 } else { 1_500.0 + (i % 13) as f64 })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &values, |b, values| {
            b.iter(|| black_box(two_sigma_outliers(values)));
        });
    }

    group.finish();
}

fn window_schedule_benchmark(c: &mut Criterion) {
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let high = start + ChronoDuration::days(365);

    c.bench_function("next_window", |b| {
        b.iter(|| {
            black_box(next_window(
                WindowAnchor::Computed(black_box(start)),
                high,
                ChronoDuration::hours(1),
            ))
        });
    });

    c.bench_function("window_schedule_year_hourly", |b| {
        b.iter(|| {
            WindowSchedule::new(WindowAnchor::Seed(start), high, ChronoDuration::hours(1)).count()
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(50);
    targets =
        preprocess_benchmark,
        outlier_benchmark,
        window_schedule_benchmark
}

criterion_main!(benches);
