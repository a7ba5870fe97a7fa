//! Nucleus extension: radial distance maps and per-voxel profiles.

use serde::{Deserialize, Serialize};

use super::{Particle, ParticleError};
use crate::distance::{DistanceMaps, RadialDistanceService};
use crate::image::{Image, ImageError, Raw};
use crate::image_proc::otsu_threshold;

/// A second channel restricted to the voxels above `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct ChannelGate<'a> {
    pub image: &'a Image<Raw>,
    pub threshold: f64,
}

impl<'a> ChannelGate<'a> {
    pub fn new(image: &'a Image<Raw>, threshold: f64) -> Self {
        Self { image, threshold }
    }

    /// Gate at the Otsu threshold of the whole (rescaled) image.
    pub fn otsu(image: &'a Image<Raw>) -> Result<Self, ImageError> {
        let factor = image.rescale_factor();
        let values = image.to_f64()?.mapv(|v| v / factor);
        Ok(Self::new(image, otsu_threshold(&values.view(), None)))
    }
}

/// One occupied voxel of a nucleus.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceRow {
    pub ivalue: f64,
    pub lamina_dist: f64,
    pub center_dist: f64,
    /// `lamina_dist / (lamina_dist + center_dist)`.
    pub lamina_dist_norm: f64,
    pub nucleus_label: u32,
    /// Whether the gated channel is above its threshold at this voxel.
    pub gated: Option<bool>,
    /// `ivalue` divided by the reference channel.
    pub ivalue_norm: Option<f64>,
}

impl Particle {
    fn nucleus_data(&self) -> Result<&super::NucleusData, ParticleError> {
        self.nucleus
            .as_ref()
            .ok_or(ParticleError::NotANucleus(self.label))
    }

    pub fn has_distances(&self) -> bool {
        matches!(&self.nucleus, Some(data) if data.distances.is_some())
    }

    pub fn distances(&self) -> Option<&DistanceMaps> {
        self.nucleus.as_ref().and_then(|data| data.distances.as_ref())
    }

    /// Store externally computed maps; both must match the mask shape.
    pub fn set_distances(&mut self, maps: DistanceMaps) -> Result<(), ParticleError> {
        if maps.shape() != self.mask.shape() {
            return Err(ParticleError::ShapeMismatch {
                expected: self.mask.shape().to_vec(),
                found: maps.shape().to_vec(),
            });
        }
        let label = self.label;
        let data = self
            .nucleus
            .as_mut()
            .ok_or(ParticleError::NotANucleus(label))?;
        data.distances = Some(maps);
        Ok(())
    }

    pub fn init_distances(
        &mut self,
        service: &dyn RadialDistanceService,
        reference: Option<&Image<Raw>>,
    ) -> Result<(), ParticleError> {
        self.nucleus_data()?;
        let maps = service.compute(self, reference)?;
        self.set_distances(maps)
    }

    /// One row per occupied voxel, in the mask's logical order.
    ///
    /// # Arguments
    /// * `image` - Intensity channel providing `ivalue`
    /// * `gate` - Optional second channel flagging voxels above its threshold
    /// * `reference` - Optional channel `ivalue` is normalized by
    ///
    /// # Returns
    /// `MissingDistances` unless both distance maps have been computed.
    pub fn intensity_at_distance(
        &self,
        image: &Image<Raw>,
        gate: Option<ChannelGate<'_>>,
        reference: Option<&Image<Raw>>,
    ) -> Result<Vec<DistanceRow>, ParticleError> {
        let maps = self
            .nucleus_data()?
            .distances
            .as_ref()
            .ok_or(ParticleError::MissingDistances(self.label))?;
        if maps.shape() != self.mask.shape() {
            return Err(ParticleError::ShapeMismatch {
                expected: self.mask.shape().to_vec(),
                found: maps.shape().to_vec(),
            });
        }

        let values = self.masked_values(image)?;
        let gated = gate
            .map(|g| {
                self.masked_values(g.image)
                    .map(|v| v.into_iter().map(|x| x > g.threshold).collect::<Vec<_>>())
            })
            .transpose()?;
        let references = reference.map(|r| self.masked_values(r)).transpose()?;

        let distances = maps
            .lamina
            .iter()
            .zip(maps.center.iter())
            .zip(self.mask.iter())
            .filter(|(_, &inside)| inside)
            .map(|((&l, &c), _)| (l, c));

        Ok(distances
            .zip(values)
            .enumerate()
            .map(|(i, ((lamina, center), ivalue))| DistanceRow {
                ivalue,
                lamina_dist: lamina,
                center_dist: center,
                lamina_dist_norm: lamina / (lamina + center),
                nucleus_label: self.label,
                gated: gated.as_ref().map(|g| g[i]),
                ivalue_norm: references.as_ref().map(|r| ivalue / r[i]),
            })
            .collect())
    }
}
