//! Typed n-dimensional images with axis semantics and lazy loading.
//!
//! [`Image<K>`] is a single container parameterized by a pixel kind:
//!
//! - [`Raw`]: unsigned intensity samples.
//! - [`Binary`]: foreground masks.
//! - [`Labeled`]: connected components, 0 is background.
//!
//! Samples live behind a [`PixelHandle`]. An image opened from a store keeps
//! its [`Backing`] and can be [`unload`](Image::unload)ed to release memory;
//! the next call to [`pixels`](Image::pixels) reloads it. Read-only callers
//! that cannot mutate use [`view`](Image::view), which never reloads.

pub mod axes;
pub mod huygens;
pub mod store;

use ndarray::{ArrayD, ArrayViewD, Zip};
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub use axes::{AxesOrder, Axis, CANONICAL_AXES};
pub use store::{
    Compression, ImageStore, SampleDepth, SaveOptions, StoredImage, StoredPixels, TiffStore,
};

use crate::image_proc::border;
use crate::image_proc::labeling::{self, Connectivity};
use crate::image_proc::morphology;
use crate::image_proc::projection::{self, ProjectionType};
use crate::image_proc::size_filter;
use crate::report::{LogReporter, Reporter};

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("TIFF error on {path}: {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },
    #[error("image metadata could not be encoded: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("unsupported sample format {format} in {path}")]
    UnsupportedSampleFormat { path: PathBuf, format: String },
    #[error("inconsistent pages in {path}: {reason}")]
    InconsistentPages { path: PathBuf, reason: String },
    #[error("invalid axis order '{axes}': {reason}")]
    InvalidAxes { axes: String, reason: String },
    #[error("unsupported array rank {rank}")]
    UnsupportedRank { rank: usize },
    #[error("image of shape {shape:?} has no samples")]
    EmptyImage { shape: Vec<usize> },
    #[error("rank mismatch: expected {expected} axes, found {found}")]
    RankMismatch { expected: usize, found: usize },
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("aspect has {found} entries but the image has {expected} axes")]
    AspectMismatch { expected: usize, found: usize },
    #[error("image has no '{axis}' axis")]
    MissingAxis { axis: char },
    #[error("pixels are not loaded")]
    NotLoaded,
    #[error("cannot unload an image without a backing path")]
    NoBackingPath,
    #[error("backing file {path} is missing, refusing to unload")]
    BackingMissing { path: PathBuf },
    #[error("maximum sample {max} does not fit in {depth}")]
    SampleOverflow { max: u64, depth: SampleDepth },
    #[error("binary image has no foreground")]
    EmptyBinary,
    #[error("rescale factor must be finite and positive, got {0}")]
    InvalidRescaleFactor(f64),
    #[error("unparsable rescaling line in {path}: '{line}'")]
    HistoryParse { path: PathBuf, line: String },
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Raw {}
    impl Sealed for super::Binary {}
    impl Sealed for super::Labeled {}
}

/// Semantic tag of an [`Image`]'s samples.
pub trait PixelKind: sealed::Sealed + fmt::Debug + Clone + Send + Sync + 'static {
    type Sample: Copy + PartialEq + Default + fmt::Debug + Send + Sync + 'static;

    const NAME: &'static str;

    /// Convert samples read from a store. With `normalize` set the kind's
    /// canonical form is enforced (rebinarization, relabeling).
    fn from_stored(
        pixels: &StoredPixels,
        normalize: bool,
    ) -> Result<ArrayD<Self::Sample>, ImageError>;

    fn to_u32(pixels: &ArrayViewD<Self::Sample>) -> ArrayD<u32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Raw;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Labeled;

impl PixelKind for Raw {
    type Sample = u32;
    const NAME: &'static str = "raw";

    fn from_stored(pixels: &StoredPixels, _normalize: bool) -> Result<ArrayD<u32>, ImageError> {
        Ok(pixels.to_u32())
    }

    fn to_u32(pixels: &ArrayViewD<u32>) -> ArrayD<u32> {
        pixels.to_owned()
    }
}

impl PixelKind for Binary {
    type Sample = bool;
    const NAME: &'static str = "binary";

    fn from_stored(pixels: &StoredPixels, normalize: bool) -> Result<ArrayD<bool>, ImageError> {
        let values = pixels.to_u32();
        if normalize {
            rebinarize(&values.view())
        } else {
            Ok(values.mapv(|v| v != 0))
        }
    }

    fn to_u32(pixels: &ArrayViewD<bool>) -> ArrayD<u32> {
        pixels.mapv(u32::from)
    }
}

impl PixelKind for Labeled {
    type Sample = u32;
    const NAME: &'static str = "labeled";

    fn from_stored(pixels: &StoredPixels, normalize: bool) -> Result<ArrayD<u32>, ImageError> {
        let values = pixels.to_u32();
        if normalize {
            let mask = above_minimum(&values.view());
            Ok(labeling::connected_components(&mask.view(), Connectivity::Full).0)
        } else {
            Ok(values)
        }
    }

    fn to_u32(pixels: &ArrayViewD<u32>) -> ArrayD<u32> {
        pixels.to_owned()
    }
}

fn above_minimum(values: &ArrayViewD<u32>) -> ArrayD<bool> {
    let min = values.iter().copied().min().unwrap_or(0);
    values.mapv(|v| v > min)
}

/// Foreground is every sample strictly above the image minimum.
fn rebinarize(values: &ArrayViewD<u32>) -> Result<ArrayD<bool>, ImageError> {
    let mask = above_minimum(values);
    if mask.iter().any(|&v| v) {
        Ok(mask)
    } else {
        Err(ImageError::EmptyBinary)
    }
}

/// File an image can be reloaded from.
#[derive(Debug, Clone)]
pub struct Backing {
    path: PathBuf,
    store: Arc<dyn ImageStore>,
}

impl Backing {
    pub fn new(path: impl Into<PathBuf>, store: Arc<dyn ImageStore>) -> Self {
        Self {
            path: path.into(),
            store,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &Arc<dyn ImageStore> {
        &self.store
    }
}

/// Sample buffer state.
#[derive(Debug, Clone)]
pub enum PixelHandle<T> {
    Loaded {
        pixels: ArrayD<T>,
        backing: Option<Backing>,
    },
    Unloaded(Backing),
}

impl<T> PixelHandle<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, PixelHandle::Loaded { .. })
    }

    pub fn backing(&self) -> Option<&Backing> {
        match self {
            PixelHandle::Loaded { backing, .. } => backing.as_ref(),
            PixelHandle::Unloaded(backing) => Some(backing),
        }
    }
}

/// How stored samples are turned into an image.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    /// Expected axes. Defaults to the stored axes, else canonical for the rank.
    pub axes: Option<AxesOrder>,
    /// Rebinarize binary images and relabel labeled images on load.
    pub normalize: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            axes: None,
            normalize: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Image<K: PixelKind> {
    handle: PixelHandle<K::Sample>,
    shape: Vec<usize>,
    axes: AxesOrder,
    aspect: Option<Vec<f64>>,
    background: Option<f64>,
    rescale_factor: f64,
    load: LoadOptions,
    kind: PhantomData<K>,
}

struct Decoded<T> {
    pixels: ArrayD<T>,
    axes: AxesOrder,
    aspect: Option<Vec<f64>>,
}

impl<K: PixelKind> Image<K> {
    /// Wrap an in-memory array with canonical axes for its rank.
    pub fn from_array(pixels: ArrayD<K::Sample>) -> Result<Self, ImageError> {
        let axes = AxesOrder::canonical(pixels.ndim())?;
        Self::with_axes(pixels, axes)
    }

    pub fn with_axes(pixels: ArrayD<K::Sample>, axes: AxesOrder) -> Result<Self, ImageError> {
        if axes.len() != pixels.ndim() {
            return Err(ImageError::RankMismatch {
                expected: pixels.ndim(),
                found: axes.len(),
            });
        }
        Ok(Self {
            shape: pixels.shape().to_vec(),
            handle: PixelHandle::Loaded {
                pixels,
                backing: None,
            },
            axes,
            aspect: None,
            background: None,
            rescale_factor: 1.0,
            load: LoadOptions::default(),
            kind: PhantomData,
        })
    }

    pub fn open(path: impl AsRef<Path>, store: Arc<dyn ImageStore>) -> Result<Self, ImageError> {
        Self::open_with(path, store, LoadOptions::default(), &LogReporter::default())
    }

    /// Load `path` through `store`.
    ///
    /// Leading axes beyond the expected rank are dropped by keeping their
    /// first entry; dropping a non-singleton axis is reported as a warning.
    pub fn open_with(
        path: impl AsRef<Path>,
        store: Arc<dyn ImageStore>,
        options: LoadOptions,
        reporter: &dyn Reporter,
    ) -> Result<Self, ImageError> {
        let backing = Backing::new(path.as_ref(), store);
        let decoded = Self::decode(&backing, &options, reporter)?;
        Ok(Self {
            shape: decoded.pixels.shape().to_vec(),
            handle: PixelHandle::Loaded {
                pixels: decoded.pixels,
                backing: Some(backing),
            },
            axes: decoded.axes,
            aspect: decoded.aspect,
            background: None,
            rescale_factor: 1.0,
            load: options,
            kind: PhantomData,
        })
    }

    fn decode(
        backing: &Backing,
        options: &LoadOptions,
        reporter: &dyn Reporter,
    ) -> Result<Decoded<K::Sample>, ImageError> {
        let stored = backing.store.load(&backing.path)?;
        let ndim = stored.pixels.ndim();
        let axes = match (&options.axes, &stored.axes) {
            (Some(axes), _) => axes.clone(),
            (None, Some(axes)) if axes.len() == ndim => axes.clone(),
            (None, _) => AxesOrder::canonical(ndim.min(CANONICAL_AXES.len()))?,
        };
        if ndim < axes.len() {
            return Err(ImageError::RankMismatch {
                expected: axes.len(),
                found: ndim,
            });
        }

        let mut pixels = stored.pixels;
        let mut aspect = stored.aspect.filter(|a| a.len() == ndim);
        while pixels.ndim() > axes.len() {
            let extent = pixels.shape()[0];
            if extent != 1 {
                reporter.warn(&format!(
                    "{}: keeping the first of {extent} entries along a leading axis",
                    backing.path.display()
                ));
            }
            pixels = pixels.first_of_leading();
            aspect = aspect.map(|a| a[1..].to_vec());
        }

        Ok(Decoded {
            pixels: K::from_stored(&pixels, options.normalize)?,
            axes,
            aspect,
        })
    }

    /// Same metadata, new samples of another kind.
    pub(crate) fn derive<K2: PixelKind>(
        &self,
        pixels: ArrayD<K2::Sample>,
        axes: AxesOrder,
    ) -> Result<Image<K2>, ImageError> {
        let mut image = Image::<K2>::with_axes(pixels, axes)?;
        image.aspect = self.aspect.clone().filter(|a| a.len() == image.ndim());
        image.background = self.background;
        image.rescale_factor = self.rescale_factor;
        Ok(image)
    }

    fn derive_same<K2: PixelKind>(
        &self,
        pixels: ArrayD<K2::Sample>,
    ) -> Result<Image<K2>, ImageError> {
        self.derive(pixels, self.axes.clone())
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn axes(&self) -> &AxesOrder {
        &self.axes
    }

    pub fn axis_len(&self, axis: Axis) -> Option<usize> {
        self.axes.position(axis).map(|i| self.shape[i])
    }

    pub fn path(&self) -> Option<&Path> {
        self.handle.backing().map(Backing::path)
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.is_loaded()
    }

    /// Per-axis physical voxel scale; all ones when never set.
    pub fn aspect(&self) -> Vec<f64> {
        self.aspect
            .clone()
            .unwrap_or_else(|| vec![1.0; self.ndim()])
    }

    pub fn set_aspect(&mut self, aspect: Vec<f64>) -> Result<(), ImageError> {
        if aspect.len() != self.ndim() {
            return Err(ImageError::AspectMismatch {
                expected: self.ndim(),
                found: aspect.len(),
            });
        }
        self.aspect = Some(aspect);
        Ok(())
    }

    pub fn background(&self) -> Option<f64> {
        self.background
    }

    pub fn set_background(&mut self, background: Option<f64>) {
        self.background = background;
    }

    pub fn rescale_factor(&self) -> f64 {
        self.rescale_factor
    }

    pub fn set_rescale_factor(&mut self, factor: f64) -> Result<(), ImageError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(ImageError::InvalidRescaleFactor(factor));
        }
        self.rescale_factor = factor;
        Ok(())
    }

    /// Samples, reloading from the backing file if they were unloaded.
    pub fn pixels(&mut self) -> Result<&ArrayD<K::Sample>, ImageError> {
        self.ensure_loaded()?;
        match &self.handle {
            PixelHandle::Loaded { pixels, .. } => Ok(pixels),
            PixelHandle::Unloaded(_) => Err(ImageError::NotLoaded),
        }
    }

    /// Borrow samples without reloading.
    pub fn view(&self) -> Result<ArrayViewD<'_, K::Sample>, ImageError> {
        match &self.handle {
            PixelHandle::Loaded { pixels, .. } => Ok(pixels.view()),
            PixelHandle::Unloaded(_) => Err(ImageError::NotLoaded),
        }
    }

    pub fn into_pixels(mut self) -> Result<ArrayD<K::Sample>, ImageError> {
        self.ensure_loaded()?;
        match self.handle {
            PixelHandle::Loaded { pixels, .. } => Ok(pixels),
            PixelHandle::Unloaded(_) => Err(ImageError::NotLoaded),
        }
    }

    pub fn ensure_loaded(&mut self) -> Result<(), ImageError> {
        let backing = match &self.handle {
            PixelHandle::Loaded { .. } => return Ok(()),
            PixelHandle::Unloaded(backing) => backing.clone(),
        };
        let decoded = Self::decode(&backing, &self.load, &LogReporter::default())?;
        if decoded.pixels.shape() != self.shape.as_slice() {
            return Err(ImageError::ShapeMismatch {
                expected: self.shape.clone(),
                found: decoded.pixels.shape().to_vec(),
            });
        }
        self.handle = PixelHandle::Loaded {
            pixels: decoded.pixels,
            backing: Some(backing),
        };
        Ok(())
    }

    /// Drop the samples, keeping the path to reload them.
    ///
    /// Fails, leaving the buffer untouched, when there is nothing to reload
    /// from.
    pub fn unload(&mut self) -> Result<(), ImageError> {
        let backing = match &self.handle {
            PixelHandle::Unloaded(_) => return Ok(()),
            PixelHandle::Loaded { backing: None, .. } => return Err(ImageError::NoBackingPath),
            PixelHandle::Loaded {
                backing: Some(backing),
                ..
            } => backing.clone(),
        };
        if !backing.path.is_file() {
            return Err(ImageError::BackingMissing { path: backing.path });
        }
        self.handle = PixelHandle::Unloaded(backing);
        Ok(())
    }

    /// Smallest unsigned depth holding the image maximum.
    pub fn dtype(&self) -> Result<SampleDepth, ImageError> {
        let values = K::to_u32(&self.view()?);
        Ok(SampleDepth::for_max(
            values.iter().copied().max().unwrap_or(0) as u64,
        ))
    }

    pub fn to_stored(&self) -> Result<StoredImage, ImageError> {
        let values = K::to_u32(&self.view()?);
        let mut stored = StoredImage::new(StoredPixels::inferred(&values.view()));
        stored.axes = Some(self.axes.clone());
        stored.aspect = self.aspect.clone();
        Ok(stored)
    }

    pub fn save(
        &self,
        path: impl AsRef<Path>,
        store: &dyn ImageStore,
        options: &SaveOptions,
    ) -> Result<(), ImageError> {
        store.save(path.as_ref(), &self.to_stored()?, options)
    }

    /// In-memory copy with axes in canonical order.
    pub fn to_canonical(&self) -> Result<Self, ImageError> {
        let view = self.view()?;
        let permutation = self.axes.canonical_permutation();
        let pixels = view
            .permuted_axes(permutation.clone())
            .as_standard_layout()
            .into_owned();
        let mut image = Self::with_axes(pixels, self.axes.to_canonical())?;
        image.aspect = self
            .aspect
            .as_ref()
            .map(|a| permutation.iter().map(|&i| a[i]).collect());
        image.background = self.background;
        image.rescale_factor = self.rescale_factor;
        Ok(image)
    }
}

impl Image<Raw> {
    /// Foreground where samples are strictly above `threshold`.
    pub fn threshold_global(&self, threshold: f64) -> Result<Image<Binary>, ImageError> {
        let mask = self.view()?.mapv(|v| v as f64 > threshold);
        self.derive_same::<Binary>(mask)
    }

    /// Collapse the depth axis.
    pub fn z_project(&self, projection: ProjectionType) -> Result<Image<Raw>, ImageError> {
        let axis = self
            .axes
            .position(Axis::Depth)
            .ok_or(ImageError::MissingAxis {
                axis: Axis::Depth.symbol(),
            })?;
        let projected = projection::z_project(&self.view()?, axis, projection);
        let mut image = self.derive::<Raw>(projected, self.axes.without(Axis::Depth)?)?;
        image.aspect = self.aspect.as_ref().map(|a| {
            a.iter()
                .enumerate()
                .filter(|(i, _)| *i != axis)
                .map(|(_, v)| *v)
                .collect()
        });
        Ok(image)
    }

    pub fn to_f64(&self) -> Result<ArrayD<f64>, ImageError> {
        Ok(self.view()?.mapv(f64::from))
    }
}

impl Image<Binary> {
    /// Wrap a mask as-is, without rebinarization.
    pub fn from_mask(mask: ArrayD<bool>) -> Result<Self, ImageError> {
        Self::from_array(mask)
    }

    /// Foreground is every sample above the minimum; fails when flat.
    pub fn binarize(samples: &ArrayViewD<u32>) -> Result<Self, ImageError> {
        Self::from_array(rebinarize(samples)?)
    }

    pub fn foreground_count(&self) -> Result<usize, ImageError> {
        Ok(self.view()?.iter().filter(|&&v| v).count())
    }

    fn combine(
        &self,
        other: &Image<Binary>,
        op: impl Fn(bool, bool) -> bool,
    ) -> Result<Self, ImageError> {
        let (a, b) = (self.view()?, other.view()?);
        if a.shape() != b.shape() {
            return Err(ImageError::ShapeMismatch {
                expected: a.shape().to_vec(),
                found: b.shape().to_vec(),
            });
        }
        let mut out = a.to_owned();
        Zip::from(&mut out).and(&b).for_each(|o, &v| *o = op(*o, v));
        self.derive_same::<Binary>(out)
    }

    pub fn logical_and(&self, other: &Image<Binary>) -> Result<Self, ImageError> {
        self.combine(other, |a, b| a && b)
    }

    pub fn logical_or(&self, other: &Image<Binary>) -> Result<Self, ImageError> {
        self.combine(other, |a, b| a || b)
    }

    pub fn logical_xor(&self, other: &Image<Binary>) -> Result<Self, ImageError> {
        self.combine(other, |a, b| a ^ b)
    }

    pub fn invert(&self) -> Result<Self, ImageError> {
        let out = self.view()?.mapv(|v| !v);
        self.derive_same::<Binary>(out)
    }

    pub fn dilate(&self, reporter: &dyn Reporter) -> Result<Self, ImageError> {
        self.derive_same::<Binary>(morphology::dilate(&self.view()?, reporter))
    }

    pub fn erode(&self, reporter: &dyn Reporter) -> Result<Self, ImageError> {
        self.derive_same::<Binary>(morphology::erode(&self.view()?, reporter))
    }

    pub fn closing(&self, reporter: &dyn Reporter) -> Result<Self, ImageError> {
        self.derive_same::<Binary>(morphology::close(&self.view()?, reporter))
    }

    pub fn opening(&self, reporter: &dyn Reporter) -> Result<Self, ImageError> {
        self.derive_same::<Binary>(morphology::open(&self.view()?, reporter))
    }

    pub fn fill_holes(&self, reporter: &dyn Reporter) -> Result<Self, ImageError> {
        self.derive_same::<Binary>(morphology::fill_holes(&self.view()?, reporter))
    }

    pub fn dilate_fill_erode(
        &self,
        iterations: usize,
        reporter: &dyn Reporter,
    ) -> Result<Self, ImageError> {
        self.derive_same::<Binary>(morphology::dilate_fill_erode(
            &self.view()?,
            iterations,
            reporter,
        ))
    }

    /// Connected components with full connectivity.
    pub fn label(&self) -> Result<Image<Labeled>, ImageError> {
        let (labels, _) = labeling::connected_components(&self.view()?, Connectivity::Full);
        self.derive_same::<Labeled>(labels)
    }
}

impl Image<Labeled> {
    /// Wrap labels as-is.
    pub fn from_labels(labels: ArrayD<u32>) -> Result<Self, ImageError> {
        Self::from_array(labels)
    }

    /// Relabel: foreground above the minimum, then connected components.
    pub fn relabeled(samples: &ArrayViewD<u32>) -> Result<Self, ImageError> {
        let mask = above_minimum(samples);
        Self::from_array(labeling::connected_components(&mask.view(), Connectivity::Full).0)
    }

    /// Re-derive labels from same-valued connected regions.
    pub fn relabel(&self) -> Result<Self, ImageError> {
        let (labels, _) = labeling::label_regions(&self.view()?, Connectivity::Full);
        self.derive_same::<Labeled>(labels)
    }

    pub fn is_monochromatic(&self) -> Result<bool, ImageError> {
        let view = self.view()?;
        let mut values = view.iter();
        Ok(match values.next() {
            Some(first) => values.all(|v| v == first),
            None => true,
        })
    }

    /// Sorted distinct non-zero labels.
    pub fn labels(&self) -> Result<Vec<u32>, ImageError> {
        Ok(labeling::unique_labels(&self.view()?))
    }

    pub fn to_binary(&self) -> Result<Image<Binary>, ImageError> {
        let mask = self.view()?.mapv(|v| v > 0);
        self.derive_same::<Binary>(mask)
    }

    pub fn clear_xy_borders(&self, reporter: &dyn Reporter) -> Result<Self, ImageError> {
        let cleared = border::clear_xy_borders(&self.view()?, &self.axes, reporter);
        self.derive_same::<Labeled>(cleared)
    }

    pub fn clear_z_borders(&self, reporter: &dyn Reporter) -> Result<Self, ImageError> {
        let cleared = border::clear_z_borders(&self.view()?, &self.axes, reporter);
        self.derive_same::<Labeled>(cleared)
    }

    /// Per-label extent over the axes named in `axes`, e.g. `"YX"` for the
    /// projected area.
    pub fn axis_sizes(&self, axes: &str) -> Result<BTreeMap<u32, usize>, ImageError> {
        let indices = self.axes.indices_of(axes)?;
        Ok(size_filter::axis_sizes(&self.view()?, &indices))
    }

    /// Zero every label whose extent over `axes` falls outside `[min, max]`.
    pub fn filter_by_axis_size(&self, axes: &str, min: f64, max: f64) -> Result<Self, ImageError> {
        let indices = self.axes.indices_of(axes)?;
        let filtered = size_filter::filter_by_axis_size(&self.view()?, &indices, min, max);
        self.derive_same::<Labeled>(filtered)
    }
}

pub(crate) fn ensure_same_shape(expected: &[usize], found: &[usize]) -> Result<(), ImageError> {
    if expected == found {
        Ok(())
    } else {
        Err(ImageError::ShapeMismatch {
            expected: expected.to_vec(),
            found: found.to_vec(),
        })
    }
}

/// Broadcast a 2D mask over the leading axes of `mask` and AND it in.
pub(crate) fn and_broadcast(
    mask: &mut ArrayD<bool>,
    plane: &ArrayViewD<bool>,
) -> Result<(), ImageError> {
    let ndim = mask.ndim();
    if plane.ndim() != 2 || ndim < 2 {
        return Err(ImageError::RankMismatch {
            expected: 2,
            found: plane.ndim(),
        });
    }
    ensure_same_shape(&mask.shape()[ndim - 2..], plane.shape())?;
    let broadcast = plane
        .broadcast(mask.raw_dim())
        .ok_or_else(|| ImageError::ShapeMismatch {
            expected: mask.shape().to_vec(),
            found: plane.shape().to_vec(),
        })?;
    Zip::from(mask).and(&broadcast).for_each(|m, &p| *m &= p);
    Ok(())
}
