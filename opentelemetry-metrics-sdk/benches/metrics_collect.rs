use std::time::SystemTime;

use criterion::{criterion_group, criterion_main, Criterion};
use opentelemetry::KeyValue;
use opentelemetry_metrics_sdk::metrics::{
    Counter, Histogram, MetricCollector, SdkMeterProvider, Temporality,
};

// Run this benchmark with:
// cargo bench --bench metrics_collect
const ATTRIBUTE_VALUES: [&str; 10] = [
    "value1", "value2", "value3", "value4", "value5", "value6", "value7", "value8", "value9",
    "value10",
];

fn setup(temporality: Temporality) -> (SdkMeterProvider, MetricCollector, Counter<i64>, Histogram<f64>) {
    let provider = SdkMeterProvider::builder().build();
    let collector = provider.register_collector(temporality);
    let meter = provider.meter("benchmarks");
    let counter = meter.counter::<i64>("counter_bench").build().unwrap();
    let histogram = meter.histogram::<f64>("histogram_bench").build().unwrap();
    (provider, collector, counter, histogram)
}

fn attributes(i: usize) -> [KeyValue; 2] {
    // 4*10 = 40 time series.
    [
        KeyValue::new("attribute1", ATTRIBUTE_VALUES[i % 4]),
        KeyValue::new("attribute2", ATTRIBUTE_VALUES[(i / 4) % 10]),
    ]
}

fn criterion_benchmark(c: &mut Criterion) {
    record(c);
    collect(c);
}

fn record(c: &mut Criterion) {
    let (_provider, _collector, counter, histogram) = setup(Temporality::Cumulative);

    let mut i = 0;
    c.bench_function("Counter_Add", |b| {
        b.iter(|| {
            i += 1;
            counter.add(1, &attributes(i)).unwrap();
        });
    });

    let mut i = 0;
    c.bench_function("Histogram_Record", |b| {
        b.iter(|| {
            i += 1;
            histogram.record((i % 1000) as f64, &attributes(i)).unwrap();
        });
    });
}

fn collect(c: &mut Criterion) {
    for (name, temporality) in [
        ("Collect_Cumulative", Temporality::Cumulative),
        ("Collect_Delta", Temporality::Delta),
    ] {
        let (provider, collector, counter, histogram) = setup(temporality);
        c.bench_function(name, |b| {
            let mut i = 0;
            b.iter(|| {
                for _ in 0..40 {
                    i += 1;
                    counter.add(1, &attributes(i)).unwrap();
                    histogram.record(i as f64, &attributes(i)).unwrap();
                }
                provider.collect_blocking(&collector, SystemTime::now())
            });
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
