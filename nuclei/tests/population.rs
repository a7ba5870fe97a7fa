//! G1 selection on synthetic populations and multi-field extraction.

use std::collections::BTreeMap;
use std::fs::File;
use std::sync::Arc;
use tempfile::TempDir;

use nuclei::image::SaveOptions;
use nuclei::population::{
    discover_fields, discover_series, FailurePolicy, FeatureRow, FitQuality,
    GaussianMixtureFitter, DEFAULT_K_SIGMA, DEFAULT_SERIES_PATTERN,
};
use nuclei::{
    FeatureTable, FieldOptions, Image, ImageStore, Labeled, NucleiList, Raw, RecordingReporter,
    TiffStore,
};
use test_helpers::{bimodal_population, cuboid, label_stack, noisy_field, output_path};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 300 G1-like nuclei around size 100, 100 G2-like ones around 200, with
/// DNA content doubling alongside.
fn bimodal_table() -> FeatureTable {
    let sizes = bimodal_population(300, (100.0, 4.0), 100, (200.0, 4.0), 17);
    let dna = bimodal_population(300, (1.0e4, 300.0), 100, (2.0e4, 300.0), 18);
    let rows = sizes
        .iter()
        .zip(&dna)
        .enumerate()
        .map(|(i, (&size, &isum))| FeatureRow {
            image: format!("field_{:03}.tif", i / 50),
            label: (i % 50) as u32 + 1,
            size: size.round() as usize,
            isum: BTreeMap::from([("dapi".to_string(), isum)]),
        })
        .collect();
    FeatureTable::new(rows)
}

#[test]
fn test_select_g1_keeps_the_low_cluster() {
    init();
    let table = bimodal_table();
    let reporter = RecordingReporter::new();
    let (selected, details) = table
        .select_g1(DEFAULT_K_SIGMA, "dapi", &GaussianMixtureFitter::default(), &reporter)
        .unwrap();

    assert_eq!(details.size.fit.quality, FitQuality::TwoComponents);
    let (lo, hi) = details.size.range;
    assert!(lo < 100.0 && hi > 100.0, "size range {lo}..{hi}");
    assert!(lo > 80.0 && hi < 125.0, "size range {lo}..{hi}");
    let (lo, hi) = details.isum.range;
    assert!(lo < 1.0e4 && hi > 1.0e4 && hi < 1.5e4, "isum range {lo}..{hi}");

    let selection = selected.selection().unwrap();
    assert_eq!(selection.reference, "dapi");
    let low_pass = selection.rows[..300].iter().filter(|r| r.pass).count();
    let high_pass = selection.rows[300..].iter().filter(|r| r.pass).count();
    assert!(low_pass > 270, "{low_pass} of the low cluster passed");
    assert_eq!(high_pass, 0);
}

#[test]
fn test_select_g1_rejects_unknown_channel() {
    let reporter = RecordingReporter::new();
    let result = bimodal_table().select_g1(
        DEFAULT_K_SIGMA,
        "lamin",
        &GaussianMixtureFitter::default(),
        &reporter,
    );
    assert!(result.is_err());
}

#[test]
fn test_selected_table_exports_selection_columns() {
    let reporter = RecordingReporter::new();
    let (selected, _) = bimodal_table()
        .select_g1(DEFAULT_K_SIGMA, "dapi", &GaussianMixtureFitter::default(), &reporter)
        .unwrap();

    let artifact = output_path("tables/g1_selection.tsv");
    selected.write_tsv(File::create(&artifact).unwrap()).unwrap();
    assert!(artifact.metadata().unwrap().len() > 0);

    let mut buffer = Vec::new();
    selected.write_tsv(&mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next().unwrap(),
        "image\tlabel\tsize\tisum_dapi\tpass_size\tpass_isum\tpass\tref"
    );
    assert_eq!(lines.count(), 400);
}

/// Writes `count` fields, each with two 3x3x3 nuclei, into `dir`.
fn write_fields(dir: &TempDir, count: usize) {
    let store = TiffStore::new();
    let shape = (5, 12, 12);
    for i in 0..count {
        let labels = label_stack(&[
            cuboid(shape, [1, 2, 2], [4, 5, 5]),
            cuboid(shape, [1, 6, 6], [4, 9, 9 - (i % 2)]),
        ]);
        let raw = noisy_field(&labels.mapv(|l| l > 0), 50.0, 500.0, 5.0, i as u64);
        let name = format!("dapi_{i:03}");
        Image::<Raw>::from_array(raw)
            .unwrap()
            .save(dir.path().join(format!("{name}.tif")), &store, &SaveOptions::default())
            .unwrap();
        Image::<Labeled>::from_labels(labels.into_dyn())
            .unwrap()
            .save(dir.path().join(format!("{name}.mask.tif")), &store, &SaveOptions::default())
            .unwrap();
    }
}

#[test]
fn test_parallel_fields_concatenate_in_input_order() {
    init();
    let dir = TempDir::new().unwrap();
    write_fields(&dir, 4);
    let fields = discover_fields(dir.path(), "", "mask").unwrap();
    assert_eq!(fields.len(), 4);

    let store: Arc<dyn ImageStore> = Arc::new(TiffStore::new());
    let reporter = RecordingReporter::new();
    let sequential = NucleiList::from_multiple_fields_of_view(
        &fields,
        &FieldOptions {
            channel: "dapi".to_string(),
            ..Default::default()
        },
        store.clone(),
        &reporter,
    )
    .unwrap();
    let parallel = NucleiList::from_multiple_fields_of_view(
        &fields,
        &FieldOptions {
            channel: "dapi".to_string(),
            threads: 3,
            ..Default::default()
        },
        store,
        &reporter,
    )
    .unwrap();

    assert_eq!(sequential.len(), 8);
    let key = |list: &NucleiList| {
        list.iter()
            .map(|n| (n.source().map(|p| p.to_path_buf()), n.label(), n.total_size()))
            .collect::<Vec<_>>()
    };
    assert_eq!(key(&sequential), key(&parallel));
    assert_eq!(sequential.nuclei()[0].source(), Some(fields[0].raw.as_path()));
    assert_eq!(sequential.nuclei()[3].total_size(), 18);

    let table = parallel.feature_table();
    assert_eq!(table.columns(), vec!["image", "label", "size", "isum_dapi"]);
    assert!(table.rows().iter().all(|r| r.isum["dapi"] > 0.0));
}

#[test]
fn test_failing_field_policy() {
    init();
    let dir = TempDir::new().unwrap();
    write_fields(&dir, 2);
    let mut fields = discover_fields(dir.path(), "", "mask").unwrap();
    fields.push(nuclei::FieldOfView::new(
        dir.path().join("absent.tif"),
        dir.path().join("absent.mask.tif"),
    ));
    let store: Arc<dyn ImageStore> = Arc::new(TiffStore::new());
    let reporter = RecordingReporter::new();

    let aborted = NucleiList::from_multiple_fields_of_view(
        &fields,
        &FieldOptions::default(),
        store.clone(),
        &reporter,
    );
    assert!(aborted.is_err());

    let options = FieldOptions {
        failure_policy: FailurePolicy::SkipField,
        ..Default::default()
    };
    let skipped =
        NucleiList::from_multiple_fields_of_view(&fields, &options, store, &reporter).unwrap();
    assert_eq!(skipped.len(), 4);
    assert!(reporter.contains(log::Level::Warn, "skipping field"));
}

#[test]
fn test_series_carry_every_channel() {
    init();
    let dir = TempDir::new().unwrap();
    write_fields(&dir, 2);
    let store: Arc<dyn ImageStore> = Arc::new(TiffStore::new());
    for i in 0..2 {
        let dapi = Image::<Raw>::open(dir.path().join(format!("dapi_{i:03}.tif")), store.clone())
            .unwrap();
        let lamin = dapi.view().unwrap().mapv(|v| 3 * v);
        Image::<Raw>::from_array(lamin)
            .unwrap()
            .save(
                dir.path().join(format!("lamin_{i:03}.tif")),
                store.as_ref(),
                &SaveOptions::default(),
            )
            .unwrap();
    }

    let reporter = RecordingReporter::new();
    let fields =
        discover_series(dir.path(), DEFAULT_SERIES_PATTERN, "dapi", "", "mask", &reporter)
            .unwrap();
    assert_eq!(fields.len(), 2);
    assert!(fields.iter().all(|f| f.channels.contains_key("lamin")));

    let options = FieldOptions::default();
    let list =
        NucleiList::from_multiple_fields_of_view(&fields, &options, store, &reporter).unwrap();
    assert_eq!(list.len(), 4);
    let table = list.feature_table();
    assert_eq!(
        table.columns(),
        vec!["image", "label", "size", "isum_dapi", "isum_lamin"]
    );
    for row in table.rows() {
        assert!((row.isum["lamin"] - 3.0 * row.isum["dapi"]).abs() < 1e-9);
    }
    assert_eq!(reporter.count(log::Level::Warn), 0);
}
