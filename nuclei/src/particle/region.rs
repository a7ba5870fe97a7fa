//! Axis-aligned bounding regions
//!
//! A [`BoundingRegion`] is a per-axis half-open range together with the shape
//! of the image it was measured on. It crops any array of that host shape.

use ndarray::{ArrayD, ArrayViewD, Dimension, Slice};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

use super::ParticleError;

/// Minimal box enclosing one component, in host image coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingRegion {
    ranges: Vec<Range<usize>>,
    host_shape: Vec<usize>,
}

impl BoundingRegion {
    /// Create a region, checking every range lies within `host_shape`.
    pub fn new(ranges: Vec<Range<usize>>, host_shape: Vec<usize>) -> Result<Self, ParticleError> {
        if ranges.len() != host_shape.len() {
            return Err(ParticleError::RankMismatch {
                expected: host_shape.len(),
                found: ranges.len(),
            });
        }
        for (range, &n) in ranges.iter().zip(&host_shape) {
            if range.start > range.end || range.end > n {
                return Err(ParticleError::RegionOutOfBounds {
                    range: range.clone(),
                    extent: n,
                });
            }
        }
        Ok(Self { ranges, host_shape })
    }

    /// Bounding region of every `true` voxel, `None` if there is none.
    pub fn from_mask(mask: &ArrayViewD<bool>) -> Option<Self> {
        let mut extents: Option<Vec<Range<usize>>> = None;
        for (index, &value) in mask.indexed_iter() {
            if value {
                grow(&mut extents, index.slice());
            }
        }
        extents.map(|ranges| Self {
            ranges,
            host_shape: mask.shape().to_vec(),
        })
    }

    /// Regions of every non-zero label, gathered in a single pass.
    pub fn regions_by_label(labels: &ArrayViewD<u32>) -> BTreeMap<u32, Self> {
        let mut extents: BTreeMap<u32, Option<Vec<Range<usize>>>> = BTreeMap::new();
        for (index, &label) in labels.indexed_iter() {
            if label != 0 {
                grow(extents.entry(label).or_insert(None), index.slice());
            }
        }
        extents
            .into_iter()
            .filter_map(|(label, ranges)| {
                ranges.map(|ranges| {
                    (
                        label,
                        Self {
                            ranges,
                            host_shape: labels.shape().to_vec(),
                        },
                    )
                })
            })
            .collect()
    }

    pub fn ndim(&self) -> usize {
        self.ranges.len()
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    pub fn host_shape(&self) -> &[usize] {
        &self.host_shape
    }

    /// Extent of the region along each axis.
    pub fn shape(&self) -> Vec<usize> {
        self.ranges.iter().map(|r| r.end - r.start).collect()
    }

    pub fn volume(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn start(&self) -> Vec<usize> {
        self.ranges.iter().map(|r| r.start).collect()
    }

    pub fn contains(&self, index: &[usize]) -> bool {
        index.len() == self.ranges.len()
            && index.iter().zip(&self.ranges).all(|(i, r)| r.contains(i))
    }

    /// Grow (positive `n`) or shrink (negative `n`) every range by `n`
    /// voxels on both sides, clipped to the host shape. Shrinking never
    /// inverts a range; it collapses to its midpoint instead.
    pub fn offset(&self, n: isize) -> Self {
        let ranges = self
            .ranges
            .iter()
            .zip(&self.host_shape)
            .map(|(range, &extent)| {
                let start = (range.start as isize - n).clamp(0, extent as isize) as usize;
                let end = (range.end as isize + n).clamp(0, extent as isize) as usize;
                if start <= end {
                    start..end
                } else {
                    let middle = (range.start + range.end) / 2;
                    middle..middle
                }
            })
            .collect();
        Self {
            ranges,
            host_shape: self.host_shape.clone(),
        }
    }

    /// Crop `array`, which must have the host shape.
    pub fn apply<'a, T>(
        &self,
        array: ArrayViewD<'a, T>,
    ) -> Result<ArrayViewD<'a, T>, ParticleError> {
        if array.shape() != self.host_shape.as_slice() {
            return Err(ParticleError::ShapeMismatch {
                expected: self.host_shape.clone(),
                found: array.shape().to_vec(),
            });
        }
        let mut view = array;
        view.slice_each_axis_inplace(|ax| Slice::from(self.ranges[ax.axis.index()].clone()));
        Ok(view)
    }

    /// Owned copy of the cropped `array`.
    pub fn crop<T: Clone>(&self, array: &ArrayViewD<T>) -> Result<ArrayD<T>, ParticleError> {
        Ok(self.apply(array.view())?.to_owned())
    }
}

fn grow(extents: &mut Option<Vec<Range<usize>>>, index: &[usize]) {
    match extents {
        Some(ranges) => {
            for (range, &i) in ranges.iter_mut().zip(index) {
                range.start = range.start.min(i);
                range.end = range.end.max(i + 1);
            }
        }
        None => *extents = Some(index.iter().map(|&i| i..i + 1).collect()),
    }
}
