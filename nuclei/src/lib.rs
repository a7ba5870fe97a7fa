//! Nuclear segmentation and particle extraction for volumetric microscopy.
//!
//! The pipeline runs leaf-first through the modules:
//!
//! - [`image`]: typed n-dimensional images with axis order and lazy loading
//! - [`segmentation`]: global and local thresholding into labeled masks
//! - [`particle`]: per-component crops with geometric and intensity features
//! - [`distance`]: radial distance maps of nuclei
//! - [`population`]: nuclei across fields of view and G1 selection
//!
//! [`image_proc`] holds the array algorithms shared by all of them, and
//! [`report`] the diagnostics sink every degradable operation writes to.

pub mod distance;
pub mod error;
pub mod image;
pub mod image_proc;
pub mod particle;
pub mod population;
pub mod report;
pub mod segmentation;

pub use error::{Error, Result};
pub use image::{AxesOrder, Axis, Binary, Image, ImageError, ImageStore, Labeled, Raw, TiffStore};
pub use particle::{BoundingRegion, Particle, ParticleError, ParticleFinder, ParticleKind};
pub use population::{FeatureTable, FieldOfView, FieldOptions, NucleiList};
pub use report::{LogReporter, RecordingReporter, Reporter};
pub use segmentation::{Binarizer, BinarizerConfig, Segmentation, SegmentationError};
