//! Propagation of 2D labels onto labeled volumes.
//!
//! Each locally derived component takes the 2D label that overlaps most of
//! its voxels. Ties go to the smaller 2D label; components without any
//! overlap become background.

use ndarray::{ArrayD, ArrayViewD, Dimension};
use std::collections::{BTreeMap, HashMap};

use super::SegmentationError;

pub fn inherit_labels(
    labels: &ArrayViewD<u32>,
    plane: &ArrayViewD<u32>,
) -> Result<ArrayD<u32>, SegmentationError> {
    let ndim = labels.ndim();
    if plane.ndim() != 2 {
        return Err(SegmentationError::MaskNotPlanar(plane.ndim()));
    }
    if ndim < 2 || labels.shape()[ndim - 2..] != *plane.shape() {
        return Err(SegmentationError::MaskShapeMismatch {
            image: labels.shape().to_vec(),
            mask: plane.shape().to_vec(),
        });
    }

    let mut overlaps: HashMap<u32, BTreeMap<u32, usize>> = HashMap::new();
    for (index, &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let coords = index.slice();
        let inherited = plane[[coords[ndim - 2], coords[ndim - 1]]];
        let counts = overlaps.entry(label).or_default();
        if inherited != 0 {
            *counts.entry(inherited).or_insert(0) += 1;
        }
    }

    let winners: HashMap<u32, u32> = overlaps
        .into_iter()
        .map(|(label, counts)| {
            let mut best = (0u32, 0usize);
            for (candidate, count) in counts {
                if count > best.1 {
                    best = (candidate, count);
                }
            }
            (label, best.0)
        })
        .collect();

    Ok(labels.mapv(|l| winners.get(&l).copied().unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array3};

    #[test]
    fn test_majority_overlap_wins() {
        // One local component spanning two 2D labels: 3 voxels under 7, 1 under 4.
        let mut labels = Array3::<u32>::zeros((2, 1, 4));
        for x in 0..4 {
            labels[[0, 0, x]] = 1;
        }
        let plane = arr2(&[[4, 7, 7, 7]]).into_dyn();
        let out = inherit_labels(&labels.into_dyn().view(), &plane.view()).unwrap();
        assert!(out.iter().filter(|&&l| l != 0).all(|&l| l == 7));
    }

    #[test]
    fn test_tie_goes_to_smaller_label() {
        let labels = arr2(&[[1, 1, 0, 2]]).into_dyn();
        let plane = arr2(&[[9, 3, 0, 0]]).into_dyn();
        let out = inherit_labels(&labels.view(), &plane.view()).unwrap();
        assert_eq!(out[[0, 0]], 3);
        assert_eq!(out[[0, 1]], 3);
        // No overlap: dropped.
        assert_eq!(out[[0, 3]], 0);
    }

    #[test]
    fn test_shape_checks() {
        let labels = ArrayD::<u32>::zeros(vec![2, 3, 3]);
        let plane = ArrayD::<u32>::zeros(vec![3, 4]);
        assert!(matches!(
            inherit_labels(&labels.view(), &plane.view()),
            Err(SegmentationError::MaskShapeMismatch { .. })
        ));
        let cube = ArrayD::<u32>::zeros(vec![2, 3, 3]);
        assert!(matches!(
            inherit_labels(&labels.view(), &cube.view()),
            Err(SegmentationError::MaskNotPlanar(3))
        ));
    }
}
