//! Crate-level error type.
//!
//! Each module owns a focused error enum; this aggregate lets callers that
//! drive the whole pipeline propagate any of them with `?`.

use thiserror::Error;

use crate::distance::DistanceError;
use crate::image::ImageError;
use crate::particle::ParticleError;
use crate::population::PopulationError;
use crate::segmentation::SegmentationError;

/// Any failure raised by the segmentation and extraction pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Segmentation(#[from] SegmentationError),
    #[error(transparent)]
    Particle(#[from] ParticleError),
    #[error(transparent)]
    Distance(#[from] DistanceError),
    #[error(transparent)]
    Population(#[from] PopulationError),
}

pub type Result<T> = std::result::Result<T, Error>;
