use criterion::{Criterion, black_box, criterion_group, criterion_main};
use shutter_core::{CalibrationEndpoints, PositionConvention, percent_for_distance};

fn bench_percent_for_distance(c: &mut Criterion) {
    let ep = CalibrationEndpoints::new(12.0, 180.0);
    let distances: Vec<f32> = (0..1_000).map(|i| 5.0 + i as f32 * 0.19).collect();

    c.bench_function("percent_for_distance", |b| {
        b.iter(|| {
            let mut acc = 0u32;
            for d in &distances {
                if let Ok(p) = percent_for_distance(
                    black_box(*d),
                    black_box(&ep),
                    PositionConvention::ClosedIsFull,
                ) {
                    acc = acc.wrapping_add(u32::from(p));
                }
            }
            black_box(acc)
        })
    });
}

criterion_group!(benches, bench_percent_for_distance);
criterion_main!(benches);
