use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nutrition_scraper::{
    build_source_url, extract_record, parse_numeral, parse_serving_size, Config,
    NutritionRecord, ScaleInput, ScaledMacroResult,
};
use std::time::Duration;

#[cfg(feature = "integration_benchmarks")]
use nutrition_scraper::{BrowserPageSource, BrowserSession, Metrics, PageSource};
#[cfg(feature = "integration_benchmarks")]
use std::sync::Arc;
#[cfg(feature = "integration_benchmarks")]
use tokio::runtime::Runtime;

const PANEL: &str = include_str!("../fixtures/nutrition_panel.html");

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

// === UNIT BENCHMARKS ===

fn benchmark_numeral_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("numeral_parsing");
    configure_fast_group(&mut group);

    let samples = ["10.4g", "Calories 285", "1,250 kcal", "Data not available"];

    group.bench_function("parse_numeral", |b| {
        b.iter(|| {
            for text in &samples {
                black_box(parse_numeral(black_box(text)));
            }
        });
    });

    group.bench_function("parse_serving_size", |b| {
        b.iter(|| black_box(parse_serving_size(black_box("slice (107g)"))));
    });

    group.finish();
}

fn benchmark_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("extraction");
    configure_fast_group(&mut group);

    group.bench_function("fixture_panel", |b| {
        b.iter(|| {
            let extraction = extract_record("pizza", black_box(PANEL), ".nf");
            let _ = black_box(extraction);
        });
    });

    group.finish();
}

fn benchmark_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("scaling");
    configure_fast_group(&mut group);

    let record = NutritionRecord {
        food_id: "bagel".to_string(),
        food_name: "Bagel".to_string(),
        serving_size: 50.0,
        quantity: 1.0,
        quantity_unit: "small".to_string(),
        calories: 155.0,
        total_fat: 0.95,
        total_carbohydrates: 30.2,
        dietary_fiber: 1.3,
        protein: 6.04,
    };

    group.bench_function("by_count", |b| {
        b.iter(|| {
            let _ = black_box(ScaledMacroResult::from_record(&record, ScaleInput::Count(3)));
        });
    });

    group.bench_function("by_weight", |b| {
        b.iter(|| {
            let _ = black_box(ScaledMacroResult::from_record(
                &record,
                ScaleInput::Weight(137.5),
            ));
        });
    });

    group.finish();
}

fn benchmark_source_url(c: &mut Criterion) {
    let mut group = c.benchmark_group("source_url");
    configure_fast_group(&mut group);

    let config = Config::default();

    group.bench_function("build", |b| {
        b.iter(|| {
            let url = build_source_url(&config.nutrition_data_url, black_box("chicken breast"));
            let _ = black_box(url);
        });
    });

    group.finish();
}

// === INTEGRATION BENCHMARKS (require Chrome) ===

#[cfg(feature = "integration_benchmarks")]
fn benchmark_live_render(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("live_render");
    configure_fast_group(&mut group);

    let config = Config::default();
    let session = Arc::new(BrowserSession::new(config.clone(), Arc::new(Metrics::new())));
    let pages = BrowserPageSource::new(session.clone(), config.clone());
    let url = build_source_url(&config.nutrition_data_url, "pizza").unwrap();

    group.bench_function("pizza", |b| {
        b.iter(|| {
            rt.block_on(async {
                let html = pages.render(url.as_str()).await;
                let record = html.and_then(|html| extract_record("pizza", &html, ".nf"));
                black_box(record.is_ok());
            })
        });
    });

    rt.block_on(session.shutdown());
    group.finish();
}

// === BENCHMARK GROUPS ===

criterion_group!(
    unit_benches,
    benchmark_numeral_parsing,
    benchmark_extraction,
    benchmark_scaling,
    benchmark_source_url,
);

#[cfg(feature = "integration_benchmarks")]
criterion_group!(integration_benches, benchmark_live_render);

#[cfg(feature = "integration_benchmarks")]
criterion_main!(unit_benches, integration_benches);

#[cfg(not(feature = "integration_benchmarks"))]
criterion_main!(unit_benches);
