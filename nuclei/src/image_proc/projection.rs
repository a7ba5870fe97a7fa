//! Projections along the depth axis.

use ndarray::{ArrayD, ArrayViewD, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionType {
    /// Sum of samples, saturating at `u32::MAX`.
    Sum,
    /// Maximum sample.
    Max,
}

pub fn z_project(image: &ArrayViewD<u32>, axis: usize, projection: ProjectionType) -> ArrayD<u32> {
    match projection {
        ProjectionType::Sum => image
            .fold_axis(Axis(axis), 0u64, |acc, &v| acc + u64::from(v))
            .mapv(|s| s.min(u64::from(u32::MAX)) as u32),
        ProjectionType::Max => image.fold_axis(Axis(axis), 0u32, |acc, &v| (*acc).max(v)),
    }
}
