//! Benchmarks for the streaming label-statistics aggregator

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use remsen_algorithms::statistics::{label_statistics, LabelStatsParams};
use remsen_core::{MultibandRaster, Raster};

fn create_pair(size: usize) -> (MultibandRaster, Raster<u32>) {
    let mut values = MultibandRaster::new(size, size, 4);
    let mut labels: Raster<u32> = Raster::new(size, size);
    for row in 0..size {
        for col in 0..size {
            let v = ((row * 7 + col * 13) % 251) as f64;
            values
                .set_pixel(row, col, &[v, v * 0.5, 255.0 - v, v + 1.0])
                .unwrap();
            labels.set(row, col, ((row / 16) * 64 + col / 16) as u32).unwrap();
        }
    }
    (values, labels)
}

fn bench_label_statistics(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics/label_stats");
    for size in [256, 512, 1024] {
        let (values, labels) = create_pair(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                label_statistics(
                    black_box(&values),
                    black_box(&labels),
                    &LabelStatsParams::default(),
                )
                .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_region_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistics/label_stats_regions");
    let (values, labels) = create_pair(512);
    for regions in [1, 4, 16, 64] {
        let params = LabelStatsParams {
            target_regions: regions,
            ..Default::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(regions), &regions, |b, _| {
            b.iter(|| label_statistics(black_box(&values), black_box(&labels), &params).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_label_statistics, bench_region_count);
criterion_main!(benches);
