//! Array algorithms behind the image and segmentation layers.
//!
//! Everything here operates on plain `ndarray` arrays and carries no image
//! metadata; [`crate::image::Image`] wraps these with axis semantics.

pub mod border;
pub mod labeling;
pub mod morphology;
pub mod projection;
pub mod size_filter;
pub mod thresholding;

pub use labeling::{connected_components, label_regions, unique_labels, Connectivity};
pub use projection::ProjectionType;
pub use thresholding::{otsu_threshold, BoundaryMode, LocalMethod};
