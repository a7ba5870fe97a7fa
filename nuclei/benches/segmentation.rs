use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array3;
use nuclei::image_proc::{connected_components, Connectivity};
use nuclei::{Binarizer, BinarizerConfig, Image, Labeled, ParticleFinder, ParticleKind, Raw};
use nuclei::report::RecordingReporter;
use std::sync::Arc;
use test_helpers::{ball, label_stack, noisy_field};

/// A grid of `per_side`² nuclei of radius 6 in one stack.
fn make_stack(per_side: usize) -> (Array3<u32>, Image<Raw>) {
    let spacing = 20;
    let side = per_side * spacing;
    let shape = (24, side, side);
    let masks: Vec<_> = (0..per_side * per_side)
        .map(|i| {
            let y = (i / per_side * spacing + spacing / 2) as f64;
            let x = (i % per_side * spacing + spacing / 2) as f64;
            ball(shape, [12.0, y, x], 6.0)
        })
        .collect();
    let labels = label_stack(&masks);
    let raw = noisy_field(&labels.mapv(|l| l > 0), 120.0, 1500.0, 30.0, 1);
    let image = Image::from_array(raw).expect("valid stack");
    (labels, image)
}

fn bench_labeling(c: &mut Criterion) {
    let (small, _) = make_stack(4);
    let (large, _) = make_stack(8);
    let small = small.mapv(|l| l > 0).into_dyn();
    let large = large.mapv(|l| l > 0).into_dyn();

    let mut group = c.benchmark_group("connected_components");
    group.bench_function("16_nuclei_24x80x80", |b| {
        b.iter(|| connected_components(black_box(&small.view()), Connectivity::Full))
    });
    group.bench_function("64_nuclei_24x160x160", |b| {
        b.iter(|| connected_components(black_box(&large.view()), Connectivity::Full))
    });
    group.finish();
}

fn bench_binarize(c: &mut Criterion) {
    let (_, image) = make_stack(4);
    let reporter = Arc::new(RecordingReporter::new());
    let global = Binarizer::with_reporter(
        BinarizerConfig {
            do_local: false,
            ..Default::default()
        },
        reporter.clone(),
    );
    let local = Binarizer::with_reporter(
        BinarizerConfig {
            local_side: 21,
            ..Default::default()
        },
        reporter,
    );

    let mut group = c.benchmark_group("binarize");
    group.sample_size(10);
    group.bench_function("global_24x80x80", |b| {
        b.iter(|| global.run(black_box(&image), None))
    });
    group.bench_function("global_local_24x80x80", |b| {
        b.iter(|| local.run(black_box(&image), None))
    });
    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let (labels, _) = make_stack(8);
    let labels = Image::<Labeled>::from_labels(labels.into_dyn()).expect("valid labels");
    let finder = ParticleFinder::new(ParticleKind::Nucleus);

    let mut group = c.benchmark_group("extract_particles");
    group.bench_function("64_nuclei", |b| {
        b.iter(|| finder.from_labeled(black_box(&labels)))
    });
    group.bench_function("64_nuclei_with_surface", |b| {
        b.iter(|| {
            finder.from_labeled(black_box(&labels)).map(|particles| {
                particles
                    .iter()
                    .map(|p| p.shape_descriptor())
                    .sum::<f64>()
            })
        })
    });
    group.finish();
}

criterion_group!(benches, bench_labeling, bench_binarize, bench_extract);
criterion_main!(benches);
