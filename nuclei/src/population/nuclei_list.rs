//! Ordered nucleus collections built from fields of view.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;

use super::field::{FailurePolicy, FieldOfView, FieldOptions};
use super::fit::CellCycleFitter;
use super::table::{FeatureRow, FeatureTable, SelectionDetails};
use super::PopulationError;
use crate::image::huygens;
use crate::image::{Image, ImageStore, Labeled, LoadOptions, PixelKind, Raw};
use crate::particle::{Particle, ParticleFinder, ParticleKind};
use crate::report::Reporter;

#[derive(Debug, Clone, Default)]
pub struct NucleiList {
    nuclei: Vec<Particle>,
}

impl NucleiList {
    pub fn new(nuclei: Vec<Particle>) -> Self {
        Self { nuclei }
    }

    pub fn nuclei(&self) -> &[Particle] {
        &self.nuclei
    }

    pub fn into_nuclei(self) -> Vec<Particle> {
        self.nuclei
    }

    pub fn len(&self) -> usize {
        self.nuclei.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nuclei.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Particle> {
        self.nuclei.iter()
    }

    /// Extract the nuclei of one field.
    ///
    /// The mask is relabeled unless `options.labeled_masks` is set. Every
    /// channel of the field is loaded in turn, recorded as intensity
    /// features on each nucleus and unloaded again; the reference channel
    /// is stored under `options.channel` unless the field names it. Nuclei
    /// take the reference raw path as their source.
    pub fn from_field_of_view(
        field: &FieldOfView,
        options: &FieldOptions,
        store: Arc<dyn ImageStore>,
        reporter: &dyn Reporter,
    ) -> Result<Self, PopulationError> {
        let mask_options = LoadOptions {
            normalize: !options.labeled_masks,
            ..LoadOptions::default()
        };
        let mut mask =
            Image::<Labeled>::open_with(&field.mask, store.clone(), mask_options, reporter)?;
        let mut nuclei = ParticleFinder::new(ParticleKind::Nucleus).from_labeled(&mask)?;
        let mask_shape = mask.shape().to_vec();
        unload_or_warn(&mut mask, &field.mask, reporter);

        for (channel, path) in field.channel_paths(&options.channel) {
            let mut raw =
                Image::<Raw>::open_with(path, store.clone(), LoadOptions::default(), reporter)?;
            if raw.shape() != mask_shape.as_slice() {
                return Err(PopulationError::FieldShapeMismatch {
                    raw: path.to_path_buf(),
                    raw_shape: raw.shape().to_vec(),
                    mask_shape,
                });
            }
            if options.do_rescale {
                raw.set_rescale_factor(huygens::rescaling_factor(path)?)?;
            }
            for nucleus in &mut nuclei {
                nucleus.init_intensity_features(&raw, channel, reporter)?;
            }
            unload_or_warn(&mut raw, path, reporter);
        }

        for nucleus in &mut nuclei {
            nucleus.set_source(&field.raw);
        }
        reporter.debug(&format!(
            "extracted {} nuclei from {}",
            nuclei.len(),
            field.raw.display()
        ));
        Ok(Self::new(nuclei))
    }

    /// Extract every field and concatenate the results in input order.
    ///
    /// With `options.threads > 1` fields run on a dedicated worker pool;
    /// otherwise sequentially with a progress bar. A failing field either
    /// fails the batch or is skipped, per `options.failure_policy`.
    pub fn from_multiple_fields_of_view(
        fields: &[FieldOfView],
        options: &FieldOptions,
        store: Arc<dyn ImageStore>,
        reporter: &dyn Reporter,
    ) -> Result<Self, PopulationError> {
        let extract = |field: &FieldOfView| {
            Self::from_field_of_view(field, options, store.clone(), reporter)
        };

        let results: Vec<Result<Self, PopulationError>> = if options.threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(options.threads)
                .build()?;
            pool.install(|| fields.par_iter().map(extract).collect())
        } else {
            let progress = ProgressBar::new(fields.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            {
                progress.set_style(style);
            }
            progress.set_message("extracting nuclei");
            let results = fields
                .iter()
                .map(|field| {
                    let result = extract(field);
                    progress.inc(1);
                    result
                })
                .collect();
            progress.finish_and_clear();
            results
        };

        let mut lists = Vec::with_capacity(results.len());
        for (field, result) in fields.iter().zip(results) {
            match result {
                Ok(list) => lists.push(list),
                Err(e) if options.failure_policy == FailurePolicy::SkipField => {
                    reporter.warn(&format!("skipping field {}: {e}", field.raw.display()));
                }
                Err(e) => {
                    return Err(PopulationError::Field {
                        raw: field.raw.clone(),
                        source: Box::new(e),
                    })
                }
            }
        }
        let nuclei = Self::concat(lists);
        reporter.info(&format!(
            "extracted {} nuclei from {} fields",
            nuclei.len(),
            fields.len()
        ));
        Ok(nuclei)
    }

    pub fn concat(lists: impl IntoIterator<Item = NucleiList>) -> Self {
        Self::new(lists.into_iter().flat_map(NucleiList::into_nuclei).collect())
    }

    /// One row per nucleus; channels missing on a nucleus read as NaN.
    pub fn feature_table(&self) -> FeatureTable {
        FeatureTable::new(
            self.nuclei
                .iter()
                .map(|n| FeatureRow {
                    image: n
                        .source()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default(),
                    label: n.label(),
                    size: n.total_size(),
                    isum: n
                        .channel_names()
                        .filter_map(|c| n.intensity_sum(c).map(|s| (c.to_string(), s)))
                        .collect(),
                })
                .collect(),
        )
    }

    /// [`FeatureTable::select_g1`] on this list's features.
    pub fn select_g1(
        &self,
        k_sigma: f64,
        channel: &str,
        fitter: &dyn CellCycleFitter,
        reporter: &dyn Reporter,
    ) -> Result<(FeatureTable, SelectionDetails), PopulationError> {
        Ok(self
            .feature_table()
            .select_g1(k_sigma, channel, fitter, reporter)?)
    }
}

fn unload_or_warn<K: PixelKind>(image: &mut Image<K>, path: &Path, reporter: &dyn Reporter) {
    if let Err(e) = image.unload() {
        reporter.warn(&format!("could not unload {}: {e}", path.display()));
    }
}

impl<'a> IntoIterator for &'a NucleiList {
    type Item = &'a Particle;
    type IntoIter = std::slice::Iter<'a, Particle>;

    fn into_iter(self) -> Self::IntoIter {
        self.nuclei.iter()
    }
}
