//! Foreground segmentation of intensity images.

mod binarizer;
pub mod config;
mod inherit;

use thiserror::Error;

use crate::image::ImageError;

pub use binarizer::{Binarizer, Segmentation};
pub use config::{BinarizerConfig, SegmentationMode, SizeFilter};
pub use inherit::inherit_labels;

#[derive(Error, Debug)]
pub enum SegmentationError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("neither global nor local thresholding is enabled")]
    NoThreshold,
    #[error("thresholding not implemented for images with {0} dimensions")]
    UnsupportedRank(usize),
    #[error("2D mask must have 2 dimensions, got {0}")]
    MaskNotPlanar(usize),
    #[error("2D mask shape {mask:?} does not match the planes of image shape {image:?}")]
    MaskShapeMismatch { image: Vec<usize>, mask: Vec<usize> },
}
