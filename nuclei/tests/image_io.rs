//! TIFF round-trips and the lazy load/unload lifecycle.

use ndarray::{Array2, Array3, ArrayD};
use std::sync::Arc;
use tempfile::TempDir;

use nuclei::image::{LoadOptions, SampleDepth, SaveOptions};
use nuclei::{AxesOrder, Image, ImageError, ImageStore, Labeled, Raw, RecordingReporter, TiffStore};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn store() -> Arc<dyn ImageStore> {
    Arc::new(TiffStore::new())
}

fn gradient_stack() -> ArrayD<u32> {
    Array3::from_shape_fn((3, 5, 7), |(z, y, x)| ((z * 35 + y * 7 + x) * 601 % 60_000) as u32)
        .into_dyn()
}

#[test]
fn test_stack_round_trip_is_lossless() {
    init();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stack.tif");
    let pixels = gradient_stack();

    let image = Image::<Raw>::from_array(pixels.clone()).unwrap();
    assert_eq!(image.dtype().unwrap(), SampleDepth::U16);
    image.save(&path, &TiffStore::new(), &SaveOptions::default()).unwrap();

    let reloaded = Image::<Raw>::open(&path, store()).unwrap();
    assert_eq!(reloaded.shape(), &[3, 5, 7]);
    assert_eq!(reloaded.axes().to_string(), "ZYX");
    assert_eq!(reloaded.view().unwrap(), pixels.view());
}

#[test]
fn test_axis_order_and_aspect_survive_save() {
    init();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("permuted.tif");
    let pixels =
        Array3::from_shape_fn((4, 6, 2), |(y, x, z)| (y * 12 + x * 2 + z) as u32).into_dyn();

    let mut image =
        Image::<Raw>::with_axes(pixels.clone(), AxesOrder::parse("YXZ").unwrap()).unwrap();
    image.set_aspect(vec![0.1, 0.1, 0.3]).unwrap();
    let options = SaveOptions {
        unit: Some("um".to_string()),
        spacing: Some(0.3),
        ..Default::default()
    };
    image.save(&path, &TiffStore::new(), &options).unwrap();

    let reloaded = Image::<Raw>::open(&path, store()).unwrap();
    assert_eq!(reloaded.axes().to_string(), "YXZ");
    assert_eq!(reloaded.aspect(), vec![0.1, 0.1, 0.3]);
    assert_eq!(reloaded.view().unwrap(), pixels.view());
}

#[test]
fn test_unload_then_reload_reproduces_samples() {
    init();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lazy.tif");
    let pixels = gradient_stack();
    Image::<Raw>::from_array(pixels.clone())
        .unwrap()
        .save(&path, &TiffStore::new(), &SaveOptions::default())
        .unwrap();

    let mut image = Image::<Raw>::open(&path, store()).unwrap();
    image.unload().unwrap();
    assert!(!image.is_loaded());
    assert_eq!(image.shape(), &[3, 5, 7]);
    assert!(matches!(image.view(), Err(ImageError::NotLoaded)));

    assert_eq!(image.pixels().unwrap(), &pixels);
    assert!(image.is_loaded());
}

#[test]
fn test_unload_without_backing_keeps_buffer() {
    let pixels = gradient_stack();
    let mut image = Image::<Raw>::from_array(pixels.clone()).unwrap();
    assert!(matches!(image.unload(), Err(ImageError::NoBackingPath)));
    assert!(image.is_loaded());
    assert_eq!(image.view().unwrap(), pixels.view());
}

#[test]
fn test_unload_refuses_missing_backing_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("gone.tif");
    Image::<Raw>::from_array(gradient_stack())
        .unwrap()
        .save(&path, &TiffStore::new(), &SaveOptions::default())
        .unwrap();
    let mut image = Image::<Raw>::open(&path, store()).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(matches!(image.unload(), Err(ImageError::BackingMissing { .. })));
    assert!(image.is_loaded());
}

#[test]
fn test_labeled_masks_keep_or_relabel_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("labels.tif");
    let mut plane = Array2::<u32>::zeros((6, 6));
    plane.slice_mut(ndarray::s![0..2, 0..2]).fill(5);
    plane.slice_mut(ndarray::s![4..6, 4..6]).fill(9);
    Image::<Labeled>::from_labels(plane.into_dyn())
        .unwrap()
        .save(&path, &TiffStore::new(), &SaveOptions::default())
        .unwrap();

    let reporter = RecordingReporter::new();
    let kept = Image::<Labeled>::open_with(
        &path,
        store(),
        LoadOptions {
            axes: None,
            normalize: false,
        },
        &reporter,
    )
    .unwrap();
    assert_eq!(kept.labels().unwrap(), vec![5, 9]);

    let relabeled = Image::<Labeled>::open(&path, store()).unwrap();
    assert_eq!(relabeled.labels().unwrap(), vec![1, 2]);
}

#[test]
fn test_open_with_fewer_axes_keeps_first_plane() {
    init();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stack.tif");
    let pixels = gradient_stack();
    Image::<Raw>::from_array(pixels.clone())
        .unwrap()
        .save(&path, &TiffStore::new(), &SaveOptions::default())
        .unwrap();

    let reporter = RecordingReporter::new();
    let plane = Image::<Raw>::open_with(
        &path,
        store(),
        LoadOptions {
            axes: Some(AxesOrder::parse("YX").unwrap()),
            normalize: true,
        },
        &reporter,
    )
    .unwrap();
    assert_eq!(plane.shape(), &[5, 7]);
    assert_eq!(
        plane.view().unwrap(),
        pixels.index_axis(ndarray::Axis(0), 0)
    );
    assert!(reporter.contains(log::Level::Warn, "keeping the first of 3"));
}
