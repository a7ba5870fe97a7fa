//! Extracted objects and their descriptors.
//!
//! A [`Particle`] owns the occupancy mask of one component, cropped to its
//! [`BoundingRegion`], plus the metadata needed to measure it in physical
//! units. Nucleus-specific state (radial distance maps) lives in an optional
//! extension selected through [`ParticleKind`].

mod convex_hull;
mod finder;
mod nucleus;
mod region;
mod surface;

use itertools::Itertools;
use ndarray::{ArrayD, Axis as NdAxis, IxDyn, Slice};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

use crate::distance::{DistanceError, DistanceMaps};
use crate::image::{AxesOrder, Image, ImageError, Raw};
use crate::image_proc::size_filter;
use crate::report::Reporter;

pub use convex_hull::{convex_hull_area, convex_hull_points};
pub use finder::ParticleFinder;
pub use nucleus::{ChannelGate, DistanceRow};
pub use region::BoundingRegion;
pub use surface::isosurface_area;

#[derive(Error, Debug)]
pub enum ParticleError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Distance(#[from] DistanceError),
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("rank mismatch: expected {expected}, found {found}")]
    RankMismatch { expected: usize, found: usize },
    #[error("range {range:?} exceeds axis extent {extent}")]
    RegionOutOfBounds { range: Range<usize>, extent: usize },
    #[error("aspect ratio has {found} entries for a {expected}-dimensional particle")]
    AspectMismatch { expected: usize, found: usize },
    #[error("monochromatic image detected")]
    Monochromatic,
    #[error("operation not available for {0}-dimensional particles")]
    UnsupportedDimensionality(usize),
    #[error("particle {0} is not a nucleus")]
    NotANucleus(u32),
    #[error("distance maps of nucleus {0} have not been computed")]
    MissingDistances(u32),
    #[error("particle has no voxels")]
    EmptyParticle,
}

/// Which particle flavor the finder builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParticleKind {
    #[default]
    Particle,
    Nucleus,
}

impl ParticleKind {
    pub fn build(
        self,
        mask: ArrayD<bool>,
        region: BoundingRegion,
        axes: AxesOrder,
        label: u32,
    ) -> Result<Particle, ParticleError> {
        let mut particle = Particle::new(mask, region, axes, label)?;
        if self == ParticleKind::Nucleus {
            particle.nucleus = Some(NucleusData::default());
        }
        Ok(particle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityStats {
    pub sum: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct NucleusData {
    distances: Option<DistanceMaps>,
}

#[derive(Debug, Clone)]
pub struct Particle {
    mask: ArrayD<bool>,
    region: BoundingRegion,
    axes: AxesOrder,
    label: u32,
    source: Option<PathBuf>,
    aspect: Vec<f64>,
    intensity: BTreeMap<String, IntensityStats>,
    total_size: usize,
    surface: OnceLock<f64>,
    nucleus: Option<NucleusData>,
}

impl Particle {
    /// Build a plain particle. `mask` must have the region's shape and
    /// `axes` one symbol per mask dimension.
    pub fn new(
        mask: ArrayD<bool>,
        region: BoundingRegion,
        axes: AxesOrder,
        label: u32,
    ) -> Result<Self, ParticleError> {
        if mask.shape() != region.shape().as_slice() {
            return Err(ParticleError::ShapeMismatch {
                expected: region.shape(),
                found: mask.shape().to_vec(),
            });
        }
        if axes.len() != mask.ndim() {
            return Err(ParticleError::RankMismatch {
                expected: mask.ndim(),
                found: axes.len(),
            });
        }
        let total_size = mask.iter().filter(|&&v| v).count();
        Ok(Self {
            aspect: vec![1.0; mask.ndim()],
            mask,
            region,
            axes,
            label,
            source: None,
            intensity: BTreeMap::new(),
            total_size,
            surface: OnceLock::new(),
            nucleus: None,
        })
    }

    pub fn mask(&self) -> &ArrayD<bool> {
        &self.mask
    }

    pub fn region(&self) -> &BoundingRegion {
        &self.region
    }

    pub fn axes(&self) -> &AxesOrder {
        &self.axes
    }

    pub fn ndim(&self) -> usize {
        self.mask.ndim()
    }

    pub fn label(&self) -> u32 {
        self.label
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn set_source(&mut self, source: impl Into<PathBuf>) {
        self.source = Some(source.into());
    }

    pub fn aspect(&self) -> &[f64] {
        &self.aspect
    }

    pub fn set_aspect(&mut self, aspect: Vec<f64>) -> Result<(), ParticleError> {
        if aspect.len() != self.ndim() {
            return Err(ParticleError::AspectMismatch {
                expected: self.ndim(),
                found: aspect.len(),
            });
        }
        self.aspect = aspect;
        self.surface = OnceLock::new();
        Ok(())
    }

    pub fn kind(&self) -> ParticleKind {
        if self.nucleus.is_some() {
            ParticleKind::Nucleus
        } else {
            ParticleKind::Particle
        }
    }

    pub fn is_nucleus(&self) -> bool {
        self.nucleus.is_some()
    }

    /// Foreground voxel count.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Physical volume: voxel count times the voxel volume.
    pub fn volume(&self) -> f64 {
        self.total_size as f64 * self.aspect.iter().product::<f64>()
    }

    /// Isosurface area of the occupancy mask, scaled by the aspect ratio.
    /// Computed once and cached.
    pub fn surface(&self) -> Result<f64, ParticleError> {
        if self.ndim() != 3 {
            return Err(ParticleError::UnsupportedDimensionality(self.ndim()));
        }
        Ok(*self
            .surface
            .get_or_init(|| isosurface_area(&self.mask.view(), &self.aspect)))
    }

    /// Compactness in `(0, 1]`.
    ///
    /// 2D: foreground area over convex hull area. 3D: surface of the sphere
    /// with the same volume over the measured surface. Any other rank
    /// yields 0.
    pub fn shape_descriptor(&self) -> f64 {
        match self.ndim() {
            2 => {
                let hull = convex_hull_area(&self.mask.view());
                if hull == 0 {
                    0.0
                } else {
                    self.total_size as f64 / hull as f64
                }
            }
            3 => {
                let surface = match self.surface() {
                    Ok(surface) if surface > 0.0 => surface,
                    _ => return 0.0,
                };
                let volume = self.volume();
                let sphere = (std::f64::consts::PI * (6.0 * volume).powi(2)).cbrt();
                sphere / surface
            }
            _ => 0.0,
        }
    }

    /// Extent over the named axes, e.g. `"YX"` for the projected area or
    /// `"Z"` for the number of slices spanned.
    pub fn axis_size(&self, axes: &str) -> Result<usize, ParticleError> {
        let indices = self.axes.indices_of(axes)?;
        let labels = self.mask.mapv(u32::from);
        Ok(size_filter::axis_sizes(&labels.view(), &indices)
            .get(&1)
            .copied()
            .unwrap_or(0))
    }

    /// The same particle with its region grown by `n` voxels per side,
    /// clipped to the host image, and its mask padded to match.
    ///
    /// Distance maps of a nucleus are padded the same way; padding voxels
    /// lie outside the mask and read 0.
    pub fn offset(&self, n: usize) -> Self {
        let region = self.region.offset(n as isize);
        let before: Vec<usize> = self
            .region
            .ranges()
            .iter()
            .zip(region.ranges())
            .map(|(old, new)| old.start - new.start)
            .collect();
        let shape = region.shape();
        let nucleus = self.nucleus.as_ref().map(|data| NucleusData {
            distances: data.distances.as_ref().map(|maps| DistanceMaps {
                lamina: pad_into(&maps.lamina, &shape, &before, 0.0),
                center: pad_into(&maps.center, &shape, &before, 0.0),
            }),
        });

        Self {
            mask: pad_into(&self.mask, &shape, &before, false),
            region,
            surface: OnceLock::new(),
            nucleus,
            ..self.clone()
        }
    }

    /// Raw samples under the mask.
    fn masked_samples(&self, image: &Image<Raw>) -> Result<Vec<u32>, ParticleError> {
        let view = image.view()?;
        let crop = self.region.apply(view)?;
        Ok(crop
            .iter()
            .zip(self.mask.iter())
            .filter(|(_, &inside)| inside)
            .map(|(&v, _)| v)
            .collect())
    }

    /// Sample values under the mask, divided by the image's rescale factor.
    pub(crate) fn masked_values(&self, image: &Image<Raw>) -> Result<Vec<f64>, ParticleError> {
        let factor = image.rescale_factor();
        Ok(self
            .masked_samples(image)?
            .into_iter()
            .map(|v| v as f64 / factor)
            .collect())
    }

    /// How often each sample value occurs under the mask.
    ///
    /// The background, when set, is rounded and subtracted first; samples
    /// below it count as 0. The rescale factor is not applied.
    pub fn intensity_value_counts(
        &self,
        image: &Image<Raw>,
    ) -> Result<BTreeMap<u64, usize>, ParticleError> {
        let background = image.background().map_or(0, |b| b.round().max(0.0) as u64);
        Ok(self
            .masked_samples(image)?
            .into_iter()
            .map(|v| u64::from(v).saturating_sub(background))
            .counts()
            .into_iter()
            .collect())
    }

    /// Record sum and mean intensity of `image` under the mask for `channel`.
    ///
    /// # Arguments
    /// * `image` - Intensity image with the host shape of this particle
    /// * `channel` - Channel name the statistics are stored under
    /// * `reporter` - Receives a warning when `channel` is being overwritten
    pub fn init_intensity_features(
        &mut self,
        image: &Image<Raw>,
        channel: &str,
        reporter: &dyn Reporter,
    ) -> Result<(), ParticleError> {
        let mut values = self.masked_values(image)?;
        if values.is_empty() {
            return Err(ParticleError::EmptyParticle);
        }
        if let Some(background) = image.background() {
            values.iter_mut().for_each(|v| *v -= background);
        }
        let sum: f64 = values.iter().sum();
        let stats = IntensityStats {
            sum,
            mean: sum / values.len() as f64,
        };
        if self.intensity.insert(channel.to_string(), stats).is_some() {
            reporter.warn(&format!(
                "overwriting intensity features of channel '{channel}' for particle {}",
                self.label
            ));
        }
        Ok(())
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.intensity.keys().map(String::as_str)
    }

    pub fn intensity(&self, channel: &str) -> Option<IntensityStats> {
        self.intensity.get(channel).copied()
    }

    pub fn intensity_sum(&self, channel: &str) -> Option<f64> {
        self.intensity(channel).map(|s| s.sum)
    }

    pub fn intensity_mean(&self, channel: &str) -> Option<f64> {
        self.intensity(channel).map(|s| s.mean)
    }
}

/// `source` placed at offset `before` inside a `shape` array of `fill`.
fn pad_into<T: Clone>(source: &ArrayD<T>, shape: &[usize], before: &[usize], fill: T) -> ArrayD<T> {
    let mut padded = ArrayD::from_elem(IxDyn(shape), fill);
    padded
        .slice_each_axis_mut(|ax| {
            let i = ax.axis.index();
            Slice::from(before[i]..before[i] + source.len_of(NdAxis(i)))
        })
        .assign(source);
    padded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::EuclideanDistanceCalculator;
    use crate::report::RecordingReporter;
    use approx::assert_relative_eq;
    use log::Level;
    use ndarray::{arr2, Array2, Array3};

    fn block_particle() -> Particle {
        let mask = ArrayD::from_elem(IxDyn(&[2, 3, 4]), true);
        let region = BoundingRegion::new(vec![1..3, 2..5, 0..4], vec![5, 8, 8]).unwrap();
        Particle::new(mask, region, AxesOrder::parse("ZYX").unwrap(), 3).unwrap()
    }

    #[test]
    fn test_new_rejects_mismatched_mask() {
        let mask = ArrayD::from_elem(IxDyn(&[2, 2]), true);
        let region = BoundingRegion::new(vec![0..2, 0..3], vec![4, 4]).unwrap();
        assert!(matches!(
            Particle::new(mask, region, AxesOrder::parse("YX").unwrap(), 1),
            Err(ParticleError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_volume_uses_aspect() {
        let mut particle = block_particle();
        assert_eq!(particle.total_size(), 24);
        assert_eq!(particle.volume(), 24.0);
        particle.set_aspect(vec![2.0, 0.5, 0.5]).unwrap();
        assert_relative_eq!(particle.volume(), 12.0);
        assert!(particle.set_aspect(vec![1.0, 1.0]).is_err());
    }

    #[test]
    fn test_kind_factory() {
        let region = BoundingRegion::new(vec![0..1, 0..1], vec![1, 1]).unwrap();
        let mask = ArrayD::from_elem(IxDyn(&[1, 1]), true);
        let axes = AxesOrder::parse("YX").unwrap();
        let nucleus = ParticleKind::Nucleus
            .build(mask.clone(), region.clone(), axes.clone(), 1)
            .unwrap();
        assert!(nucleus.is_nucleus());
        let plain = ParticleKind::Particle.build(mask, region, axes, 1).unwrap();
        assert_eq!(plain.kind(), ParticleKind::Particle);
    }

    #[test]
    fn test_shape_descriptor_2d() {
        let square = ArrayD::from_elem(IxDyn(&[3, 3]), true);
        let region = BoundingRegion::new(vec![0..3, 0..3], vec![3, 3]).unwrap();
        let particle = Particle::new(square, region, AxesOrder::parse("YX").unwrap(), 1).unwrap();
        assert_relative_eq!(particle.shape_descriptor(), 1.0);

        let l_shape = arr2(&[
            [true, false, false],
            [true, false, false],
            [true, true, true],
        ])
        .into_dyn();
        let region = BoundingRegion::new(vec![0..3, 0..3], vec![3, 3]).unwrap();
        let particle = Particle::new(l_shape, region, AxesOrder::parse("YX").unwrap(), 1).unwrap();
        let descriptor = particle.shape_descriptor();
        assert!(descriptor > 0.0 && descriptor < 1.0, "{descriptor}");
    }

    #[test]
    fn test_shape_descriptor_3d_prefers_compact() {
        let n = 9;
        let ball = Array3::from_shape_fn((n, n, n), |(z, y, x)| {
            let c = (n / 2) as f64;
            let d2 = (z as f64 - c).powi(2) + (y as f64 - c).powi(2) + (x as f64 - c).powi(2);
            d2 <= 16.0
        })
        .into_dyn();
        let region = BoundingRegion::new(vec![0..n, 0..n, 0..n], vec![n, n, n]).unwrap();
        let ball = Particle::new(ball, region, AxesOrder::parse("ZYX").unwrap(), 1).unwrap();

        let rod = ArrayD::from_elem(IxDyn(&[1, 1, 27]), true);
        let region = BoundingRegion::new(vec![0..1, 0..1, 0..27], vec![1, 1, 27]).unwrap();
        let rod = Particle::new(rod, region, AxesOrder::parse("ZYX").unwrap(), 2).unwrap();

        assert!(ball.shape_descriptor() > rod.shape_descriptor());
        assert!(ball.shape_descriptor() > 0.0);
    }

    #[test]
    fn test_surface_only_3d() {
        let mask = ArrayD::from_elem(IxDyn(&[2, 2]), true);
        let region = BoundingRegion::new(vec![0..2, 0..2], vec![2, 2]).unwrap();
        let particle = Particle::new(mask, region, AxesOrder::parse("YX").unwrap(), 1).unwrap();
        assert!(matches!(
            particle.surface(),
            Err(ParticleError::UnsupportedDimensionality(2))
        ));
        assert!(block_particle().surface().unwrap() > 0.0);
    }

    #[test]
    fn test_axis_size() {
        let mut mask = ArrayD::from_elem(IxDyn(&[3, 2, 2]), false);
        mask[[0, 0, 0]] = true;
        mask[[1, 0, 0]] = true;
        mask[[2, 1, 1]] = true;
        let region = BoundingRegion::new(vec![0..3, 0..2, 0..2], vec![3, 2, 2]).unwrap();
        let particle = Particle::new(mask, region, AxesOrder::parse("ZYX").unwrap(), 1).unwrap();
        assert_eq!(particle.axis_size("YX").unwrap(), 2);
        assert_eq!(particle.axis_size("Z").unwrap(), 3);
        assert!(particle.axis_size("T").is_err());
    }

    #[test]
    fn test_offset_pads_by_clipped_amount() {
        let particle = block_particle();
        let padded = particle.offset(2);
        assert_eq!(padded.region().ranges(), &[0..5, 0..7, 0..6]);
        assert_eq!(padded.mask().shape(), &[5, 7, 6]);
        assert_eq!(padded.total_size(), 24);
        assert!(padded.mask()[[1, 2, 0]]);
        assert!(!padded.mask()[[0, 0, 0]]);
    }

    #[test]
    fn test_offset_pads_distance_maps() {
        let mask = ArrayD::from_elem(IxDyn(&[3, 3]), true);
        let region = BoundingRegion::new(vec![1..4, 1..4], vec![5, 5]).unwrap();
        let mut nucleus = ParticleKind::Nucleus
            .build(mask, region, AxesOrder::parse("YX").unwrap(), 4)
            .unwrap();
        nucleus
            .init_distances(&EuclideanDistanceCalculator::default(), None)
            .unwrap();
        let image = Image::<Raw>::from_array(
            Array2::from_shape_fn((5, 5), |(y, x)| (y * 5 + x) as u32).into_dyn(),
        )
        .unwrap();
        let before = nucleus.intensity_at_distance(&image, None, None).unwrap();

        let padded = nucleus.offset(1);
        let maps = padded.distances().unwrap();
        assert_eq!(maps.shape(), padded.mask().shape());
        assert_eq!(maps.lamina[[0, 0]], 0.0);
        let after = padded.intensity_at_distance(&image, None, None).unwrap();
        assert_eq!(after.len(), 9);
        assert_eq!(after, before);
    }

    #[test]
    fn test_intensity_value_counts() {
        let mut pixels = Array3::<u32>::zeros((5, 8, 8));
        pixels[[1, 2, 0]] = 7;
        pixels[[1, 2, 1]] = 7;
        pixels[[2, 4, 3]] = 1;
        pixels[[0, 0, 0]] = 7;
        let mut image = Image::<Raw>::from_array(pixels.into_dyn()).unwrap();
        let particle = block_particle();

        let counts = particle.intensity_value_counts(&image).unwrap();
        assert_eq!(counts, BTreeMap::from([(0, 21), (1, 1), (7, 2)]));

        image.set_background(Some(2.0));
        let counts = particle.intensity_value_counts(&image).unwrap();
        assert_eq!(counts, BTreeMap::from([(0, 22), (5, 2)]));
        assert_eq!(counts.values().sum::<usize>(), particle.total_size());
    }

    #[test]
    fn test_intensity_features() {
        let mut image = Array3::<u32>::zeros((5, 8, 8));
        for z in 1..3 {
            for y in 2..5 {
                for x in 0..4 {
                    image[[z, y, x]] = 10;
                }
            }
        }
        let mut image = Image::<Raw>::from_array(image.into_dyn()).unwrap();
        image.set_background(Some(2.0));
        image.set_rescale_factor(2.0).unwrap();

        let reporter = RecordingReporter::new();
        let mut particle = block_particle();
        particle.init_intensity_features(&image, "dapi", &reporter).unwrap();
        let stats = particle.intensity("dapi").unwrap();
        assert_relative_eq!(stats.mean, 3.0);
        assert_relative_eq!(stats.sum, 72.0);
        assert_eq!(reporter.count(Level::Warn), 0);

        particle.init_intensity_features(&image, "dapi", &reporter).unwrap();
        assert!(reporter.contains(Level::Warn, "overwriting"));
        assert_eq!(particle.channel_names().collect::<Vec<_>>(), vec!["dapi"]);
        assert!(particle.intensity_sum("other").is_none());
    }

    #[test]
    fn test_intensity_features_shape_mismatch() {
        let image = Image::<Raw>::from_array(ArrayD::zeros(IxDyn(&[5, 8, 7]))).unwrap();
        let mut particle = block_particle();
        assert!(matches!(
            particle.init_intensity_features(&image, "x", &RecordingReporter::new()),
            Err(ParticleError::ShapeMismatch { .. })
        ));
    }
}
