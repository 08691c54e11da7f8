use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rmsbridge::processing::channels::channel_map;
use rmsbridge::processing::rms::{rms, RmsResult};
use rmsbridge::SampleWindow;

fn sine(len: usize, freq: f64) -> Vec<f64> {
    (0..len)
        .map(|i| (2.0 * std::f64::consts::PI * freq * i as f64 / 250.0).sin())
        .collect()
}

fn bench_rms(c: &mut Criterion) {
    let mut group = c.benchmark_group("rms");
    for len in [250usize, 1000, 5000] {
        let samples = sine(len, 10.0);
        group.bench_with_input(BenchmarkId::from_parameter(len), &samples, |b, s| {
            b.iter(|| rms(black_box(s)))
        });
    }
    group.finish();
}

fn bench_cycle(c: &mut Criterion) {
    let names: Vec<(String, i64)> = (1..=8).map(|i| (format!("ch{i}"), i)).collect();
    let channels = channel_map(names).unwrap();
    let columns = (0..8).map(|i| sine(256, 1.0 + i as f64)).collect();
    let window = SampleWindow::from_columns(256, columns).unwrap();

    c.bench_function("rms_result_8x256", |b| {
        b.iter(|| RmsResult::compute(black_box(&channels), black_box(&window)))
    });
}

criterion_group!(benches, bench_rms, bench_cycle);
criterion_main!(benches);
