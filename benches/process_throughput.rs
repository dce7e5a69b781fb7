//! Criterion benchmarks for the per-frame processing path.
//!
//! Key metrics:
//! - `Manager::process` latency per controller type and frame size
//! - Sharpness metric cost on a full frame
//!
//! Run with: cargo bench --bench process_throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_afl::algorithm::sharpness::sharpness;
use rust_afl::algorithm::statistics::WeightMap;
use rust_afl::hardware::SimulatedCamera;
use rust_afl::{ControllerType, Library, Manager, Mode, RoiCombination, SharpnessAlgorithm};
use std::sync::Arc;

/// Benchmark one continuous controller per manager at common frame sizes.
fn process_per_controller(c: &mut Criterion) {
    let mut group = c.benchmark_group("manager_process");

    let sizes = [("320x240", 320, 240), ("1280x960", 1280, 960)];
    for kind in [ControllerType::Brightness, ControllerType::Autofocus] {
        for (name, width, height) in sizes {
            let library = Library::init();
            let camera = Arc::new(SimulatedCamera::new(width, height, false));
            let manager = Manager::new(&library, camera.clone()).unwrap();
            let controller = manager.create_controller(kind).unwrap();
            controller.set_mode(Mode::Continuous).unwrap();
            let frame = camera.capture();

            group.throughput(Throughput::Bytes(frame.data.len() as u64));
            group.bench_with_input(
                BenchmarkId::new(kind.to_string(), name),
                &frame,
                |b, frame| {
                    b.iter(|| manager.process(black_box(frame)).unwrap());
                },
            );
        }
    }

    group.finish();
}

/// Benchmark the sharpness metrics on a 640x480 frame.
fn sharpness_metrics(c: &mut Criterion) {
    let mut group = c.benchmark_group("sharpness");
    let frame = SimulatedCamera::new(640, 480, false)
        .with_initial(10_000.0, 1.0, 600)
        .capture();
    let weights = WeightMap::new(640, 480, &[], RoiCombination::Additive);

    for algorithm in SharpnessAlgorithm::ALL {
        group.bench_function(format!("{algorithm:?}"), |b| {
            b.iter(|| sharpness(algorithm, black_box(&frame), &weights));
        });
    }

    group.finish();
}

criterion_group!(benches, process_per_controller, sharpness_metrics);
criterion_main!(benches);
