//! Radial distance maps of nuclei.
//!
//! A [`RadialDistanceService`] turns a particle's occupancy mask into two
//! maps over its local frame: the distance of every voxel to the nuclear
//! lamina (the nearest background voxel) and to the nuclear center.
//! Background voxels carry 0 in both maps.

use ndarray::{ArrayD, ArrayViewD, Dimension, IxDyn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image::{Image, Raw};
use crate::image_proc::morphology::pad;
use crate::particle::Particle;

#[derive(Error, Debug)]
pub enum DistanceError {
    #[error("distance maps of shape {found:?} do not match particle shape {expected:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("particle {0} has no foreground voxels")]
    EmptyParticle(u32),
    #[error("invalid center quantile {0}, expected a value in [0, 1]")]
    InvalidQuantile(f64),
    #[error("distance service failed: {0}")]
    Service(String),
}

/// Lamina and center distance maps in a particle's local frame.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMaps {
    pub lamina: ArrayD<f64>,
    pub center: ArrayD<f64>,
}

impl DistanceMaps {
    pub fn new(lamina: ArrayD<f64>, center: ArrayD<f64>) -> Result<Self, DistanceError> {
        if lamina.shape() != center.shape() {
            return Err(DistanceError::ShapeMismatch {
                expected: lamina.shape().to_vec(),
                found: center.shape().to_vec(),
            });
        }
        Ok(Self { lamina, center })
    }

    pub fn shape(&self) -> &[usize] {
        self.lamina.shape()
    }
}

/// Computes radial distance maps for one particle.
///
/// Implementations may use `reference` (a second channel with the host
/// shape) to locate the center; failures are returned, never retried.
pub trait RadialDistanceService: Send + Sync {
    fn compute(
        &self,
        particle: &Particle,
        reference: Option<&Image<Raw>>,
    ) -> Result<DistanceMaps, DistanceError>;
}

/// Which voxels make up the nuclear center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CenterDefinition {
    /// Voxels at the maximum lamina distance.
    CenterMax,
    /// Voxels whose lamina distance reaches the given quantile.
    CenterTopQuantile(f64),
}

impl Default for CenterDefinition {
    fn default() -> Self {
        CenterDefinition::CenterTopQuantile(0.99)
    }
}

/// Aspect-weighted Euclidean distances between voxel centers.
///
/// The lamina distance of a voxel is its distance to the nearest background
/// voxel, counting the one-voxel frame around the crop as background. The
/// center distance is its distance to the nearest center voxel. The
/// reference channel is not used.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanDistanceCalculator {
    pub center: CenterDefinition,
}

impl EuclideanDistanceCalculator {
    pub fn new(center: CenterDefinition) -> Self {
        Self { center }
    }

    fn lamina_map(&self, mask: &ArrayViewD<bool>, aspect: &[f64]) -> ArrayD<f64> {
        let padded = pad(mask, 1, false);
        let boundary: Vec<Vec<f64>> = padded
            .indexed_iter()
            .filter(|(index, &inside)| !inside && touches_foreground(&padded.view(), index.slice()))
            .map(|(index, _)| physical(index.slice(), aspect, -1.0))
            .collect();
        distance_to_nearest(mask, aspect, &boundary)
    }

    fn center_voxels(
        &self,
        mask: &ArrayViewD<bool>,
        lamina: &ArrayD<f64>,
        aspect: &[f64],
    ) -> Result<Vec<Vec<f64>>, DistanceError> {
        let mut values: Vec<f64> = lamina
            .iter()
            .zip(mask.iter())
            .filter(|(_, &inside)| inside)
            .map(|(&d, _)| d)
            .collect();
        values.sort_by(f64::total_cmp);
        let cutoff = match self.center {
            CenterDefinition::CenterMax => values.last().copied().unwrap_or(0.0),
            CenterDefinition::CenterTopQuantile(q) => {
                if !(0.0..=1.0).contains(&q) {
                    return Err(DistanceError::InvalidQuantile(q));
                }
                quantile(&values, q)
            }
        };
        Ok(lamina
            .indexed_iter()
            .filter(|(index, &d)| mask[index.slice()] && d >= cutoff)
            .map(|(index, _)| physical(index.slice(), aspect, 0.0))
            .collect())
    }
}

impl RadialDistanceService for EuclideanDistanceCalculator {
    fn compute(
        &self,
        particle: &Particle,
        _reference: Option<&Image<Raw>>,
    ) -> Result<DistanceMaps, DistanceError> {
        if particle.total_size() == 0 {
            return Err(DistanceError::EmptyParticle(particle.label()));
        }
        let mask = particle.mask().view();
        let aspect = particle.aspect();
        let lamina = self.lamina_map(&mask, aspect);
        let centers = self.center_voxels(&mask, &lamina, aspect)?;
        let center = distance_to_nearest(&mask, aspect, &centers);
        DistanceMaps::new(lamina, center)
    }
}

fn touches_foreground(padded: &ArrayViewD<bool>, index: &[usize]) -> bool {
    let shape = padded.shape();
    (0..index.len()).any(|axis| {
        [-1isize, 1].iter().any(|&step| {
            let pos = index[axis] as isize + step;
            if pos < 0 || pos as usize >= shape[axis] {
                return false;
            }
            let mut neighbor = index.to_vec();
            neighbor[axis] = pos as usize;
            padded[IxDyn(&neighbor)]
        })
    })
}

/// Physical position of a voxel, shifted by `shift` voxels along every axis.
fn physical(index: &[usize], aspect: &[f64], shift: f64) -> Vec<f64> {
    index
        .iter()
        .zip(aspect)
        .map(|(&i, &a)| (i as f64 + shift) * a)
        .collect()
}

fn distance_to_nearest(
    mask: &ArrayViewD<bool>,
    aspect: &[f64],
    targets: &[Vec<f64>],
) -> ArrayD<f64> {
    let indices: Vec<IxDyn> = mask
        .indexed_iter()
        .filter(|(_, &inside)| inside)
        .map(|(index, _)| index)
        .collect();
    let distances: Vec<f64> = indices
        .par_iter()
        .map(|index| {
            let p = physical(index.slice(), aspect, 0.0);
            targets
                .iter()
                .map(|t| {
                    p.iter()
                        .zip(t)
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum::<f64>()
                })
                .fold(f64::INFINITY, f64::min)
                .sqrt()
        })
        .collect();

    let mut map = ArrayD::zeros(mask.raw_dim());
    for (index, d) in indices.into_iter().zip(distances) {
        map[index] = if d.is_finite() { d } else { 0.0 };
    }
    map
}

/// Linear-interpolated quantile of sorted `values`.
fn quantile(values: &[f64], q: f64) -> f64 {
    match values.len() {
        0 => 0.0,
        1 => values[0],
        n => {
            let pos = q * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            values[lo] + (values[hi] - values[lo]) * (pos - lo as f64)
        }
    }
}
