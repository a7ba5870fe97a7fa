use ndarray::{ArrayD, Zip};
use std::sync::Arc;

use super::config::{BinarizerConfig, SizeFilter};
use super::inherit::inherit_labels;
use super::SegmentationError;
use crate::image::{and_broadcast, AxesOrder, Axis, Binary, Image, ImageError, Labeled, Raw};
use crate::image_proc::labeling::{connected_components, label_regions, Connectivity};
use crate::image_proc::size_filter::filter_by_axis_size;
use crate::image_proc::thresholding::{apply_threshold, local_threshold_mask, otsu_threshold};
use crate::image_proc::{border, morphology};
use crate::report::{default_reporter, Reporter};

/// Result of a binarization run.
#[derive(Debug, Clone)]
pub struct Segmentation {
    labels: Image<Labeled>,
    global_threshold: Option<f64>,
}

impl Segmentation {
    pub fn labels(&self) -> &Image<Labeled> {
        &self.labels
    }

    pub fn into_labels(self) -> Image<Labeled> {
        self.labels
    }

    /// Otsu threshold used for the global mask, if it was computed.
    pub fn global_threshold(&self) -> Option<f64> {
        self.global_threshold
    }

    pub fn mask(&self) -> Result<Image<Binary>, ImageError> {
        self.labels.to_binary()
    }

    pub fn component_count(&self) -> Result<usize, ImageError> {
        Ok(self.labels.labels()?.len())
    }
}

/// Turns intensity images into labeled foreground masks.
///
/// Steps, in order: optional depth projection, global Otsu threshold with
/// closing, per-plane local threshold with optional closing, intersection
/// with an optional 2D mask, labeling, XY and Z border clearing, hole
/// filling, dilate-fill-erode, size filtering and finally 2D label
/// inheritance.
#[derive(Clone)]
pub struct Binarizer {
    config: BinarizerConfig,
    reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for Binarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binarizer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Binarizer {
    pub fn new(config: BinarizerConfig) -> Self {
        Self::with_reporter(config, default_reporter())
    }

    pub fn with_reporter(config: BinarizerConfig, reporter: Arc<dyn Reporter>) -> Self {
        Self { config, reporter }
    }

    pub fn config(&self) -> &BinarizerConfig {
        &self.config
    }

    /// Segment `image`, optionally restricted to and relabeled by `mask2d`.
    pub fn run(
        &self,
        image: &Image<Raw>,
        mask2d: Option<&Image<Labeled>>,
    ) -> Result<Segmentation, SegmentationError> {
        let reporter = self.reporter.as_ref();
        let config = &self.config;
        if !config.uses_any_threshold() {
            reporter.error("binarization requested with neither global nor local threshold");
            return Err(SegmentationError::NoThreshold);
        }

        let canonical;
        let image = if image.axes().is_canonical() {
            image
        } else {
            canonical = image.to_canonical()?;
            &canonical
        };

        let projected;
        let image = match config.segmentation_mode.projection() {
            Some(projection) if image.axes().contains(Axis::Depth) => {
                projected = image.z_project(projection)?;
                &projected
            }
            Some(_) => {
                reporter.info("image has no depth axis, projection skipped");
                image
            }
            None => image,
        };

        let values = image.to_f64()?;
        let mut mask: Option<ArrayD<bool>> = None;
        let mut global_threshold = None;

        if config.do_global {
            let threshold = otsu_threshold(&values.view(), None);
            reporter.info(&format!("global threshold: {threshold:.3}"));
            global_threshold = Some(threshold);
            let global = apply_threshold(&values.view(), threshold);
            mask = Some(morphology::close(&global.view(), reporter));
        }

        if config.do_local {
            let side = config.local_side();
            match local_threshold_mask(
                &values.view(),
                side,
                config.local_method,
                config.local_mode,
                config.local_offset,
            ) {
                Some(local) => {
                    let local = if config.local_closing {
                        morphology::close(&local.view(), reporter)
                    } else {
                        local
                    };
                    mask = Some(match mask {
                        Some(mut combined) => {
                            Zip::from(&mut combined)
                                .and(&local)
                                .for_each(|a, &b| *a &= b);
                            combined
                        }
                        None => local,
                    });
                }
                None => reporter.info(&format!(
                    "local threshold not implemented for images with {} dimensions",
                    values.ndim()
                )),
            }
        }

        let mut mask = mask.ok_or(SegmentationError::UnsupportedRank(values.ndim()))?;

        let plane = match mask2d {
            Some(labels) => Some(planar_labels(labels, &mask)?),
            None => None,
        };
        if let Some(plane) = &plane {
            let plane_mask = plane.mapv(|l| l > 0);
            and_broadcast(&mut mask, &plane_mask.view())?;
        }

        let axes = image.axes();
        let (mut labels, _) = connected_components(&mask.view(), Connectivity::Full);
        if config.clear_xy_borders {
            labels = border::clear_xy_borders(&labels.view(), axes, reporter);
        }
        if config.clear_z_borders {
            labels = border::clear_z_borders(&labels.view(), axes, reporter);
        }

        if config.fill_holes || config.dilate_fill_erode > 0 {
            let mut mask = labels.mapv(|l| l > 0);
            if config.fill_holes {
                mask = morphology::fill_holes(&mask.view(), reporter);
            }
            if config.dilate_fill_erode > 0 {
                mask = morphology::dilate_fill_erode(
                    &mask.view(),
                    config.dilate_fill_erode,
                    reporter,
                );
            }
            labels = connected_components(&mask.view(), Connectivity::Full).0;
        }

        if let Some(filter) = &config.size_filter {
            labels = apply_size_filter(labels, axes, filter);
        }

        if let Some(plane) = &plane {
            labels = inherit_labels(&labels.view(), &plane.view())?;
        }

        let labels = image.derive::<Labeled>(labels, axes.clone())?;
        Ok(Segmentation {
            labels,
            global_threshold,
        })
    }
}

/// The 2D label mask as a plain array, checked against the mask planes.
fn planar_labels(
    labels: &Image<Labeled>,
    mask: &ArrayD<bool>,
) -> Result<ArrayD<u32>, SegmentationError> {
    let view = labels.view()?;
    if view.ndim() != 2 {
        return Err(SegmentationError::MaskNotPlanar(view.ndim()));
    }
    let ndim = mask.ndim();
    if ndim < 2 || mask.shape()[ndim - 2..] != *view.shape() {
        return Err(SegmentationError::MaskShapeMismatch {
            image: mask.shape().to_vec(),
            mask: view.shape().to_vec(),
        });
    }
    Ok(view.to_owned())
}

fn apply_size_filter(labels: ArrayD<u32>, axes: &AxesOrder, filter: &SizeFilter) -> ArrayD<u32> {
    let mut labels = labels;
    if let (Some(y), Some(x)) = (axes.position(Axis::Row), axes.position(Axis::Column)) {
        let (min_area, max_area) = filter.area_interval();
        labels = filter_by_axis_size(&labels.view(), &[y, x], min_area, max_area);
    }
    if let Some(z) = axes.position(Axis::Depth) {
        let min_slices = filter.min_z_fraction * labels.shape()[z] as f64;
        labels = filter_by_axis_size(&labels.view(), &[z], min_slices, f64::INFINITY);
    }
    label_regions(&labels.view(), Connectivity::Full).0
}
