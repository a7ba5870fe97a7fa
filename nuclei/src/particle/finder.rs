//! Splitting labeled images into particles.

use rayon::prelude::*;

use super::{BoundingRegion, Particle, ParticleError, ParticleKind};
use crate::image::{Binary, Image, Labeled};

/// Builds one particle per non-zero label of an image.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParticleFinder {
    kind: ParticleKind,
}

impl ParticleFinder {
    pub fn new(kind: ParticleKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> ParticleKind {
        self.kind
    }

    /// Label `image` with full connectivity, then extract.
    pub fn from_binary(&self, image: &Image<Binary>) -> Result<Vec<Particle>, ParticleError> {
        self.from_labeled(&image.label()?)
    }

    /// Particles in ascending label order, each carrying a copy of its
    /// cropped mask, the image axes and aspect, and its label.
    ///
    /// Fails with [`ParticleError::Monochromatic`] when every sample has the
    /// same value.
    pub fn from_labeled(&self, image: &Image<Labeled>) -> Result<Vec<Particle>, ParticleError> {
        if image.is_monochromatic()? {
            return Err(ParticleError::Monochromatic);
        }
        let labels = image.view()?;
        let regions: Vec<(u32, BoundingRegion)> =
            BoundingRegion::regions_by_label(&labels).into_iter().collect();
        let aspect = image.aspect();

        regions
            .into_par_iter()
            .map(|(label, region)| -> Result<Particle, ParticleError> {
                let mask = region.apply(labels.view())?.mapv(|v| v == label);
                let mut particle = self.kind.build(mask, region, image.axes().clone(), label)?;
                particle.set_aspect(aspect.clone())?;
                if let Some(path) = image.path() {
                    particle.set_source(path);
                }
                Ok(particle)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array3, ArrayD, IxDyn};

    #[test]
    fn test_extracts_each_label() {
        let labels = arr2(&[[0, 2, 2, 0], [0, 0, 0, 0], [5, 0, 0, 1], [5, 5, 0, 1]]).into_dyn();
        let image = Image::<Labeled>::from_labels(labels).unwrap();
        let particles = ParticleFinder::default().from_labeled(&image).unwrap();
        let found: Vec<(u32, usize)> = particles
            .iter()
            .map(|p| (p.label(), p.total_size()))
            .collect();
        assert_eq!(found, vec![(1, 2), (2, 2), (5, 3)]);
        assert_eq!(particles[2].mask().shape(), &[2, 2]);
        assert!(!particles[2].mask()[[0, 1]]);
        assert_eq!(particles[0].axes().to_string(), "YX");
    }

    #[test]
    fn test_overlapping_boxes_keep_only_own_label() {
        // Label 2 wraps around label 1, so the crop of 2 contains 1.
        let mut labels = Array3::<u32>::zeros((1, 3, 3));
        for y in 0..3 {
            for x in 0..3 {
                labels[[0, y, x]] = 2;
            }
        }
        labels[[0, 1, 1]] = 1;
        let image = Image::<Labeled>::from_labels(labels.into_dyn()).unwrap();
        let particles = ParticleFinder::new(ParticleKind::Nucleus)
            .from_labeled(&image)
            .unwrap();
        assert_eq!(particles[1].total_size(), 8);
        assert!(!particles[1].mask()[[0, 1, 1]]);
        assert!(particles.iter().all(Particle::is_nucleus));
    }

    #[test]
    fn test_monochromatic_rejected() {
        let image = Image::<Labeled>::from_labels(ArrayD::from_elem(IxDyn(&[3, 3]), 4)).unwrap();
        assert!(matches!(
            ParticleFinder::default().from_labeled(&image),
            Err(ParticleError::Monochromatic)
        ));
    }

    #[test]
    fn test_from_binary_labels_first() {
        let mask = arr2(&[[true, false, true], [true, false, false]]).into_dyn();
        let mut image = Image::<Binary>::from_mask(mask).unwrap();
        image.set_aspect(vec![0.5, 0.25]).unwrap();
        let particles = ParticleFinder::default().from_binary(&image).unwrap();
        assert_eq!(particles.len(), 2);
        assert_eq!(particles[0].aspect(), &[0.5, 0.25]);
        assert_eq!(particles[0].volume(), 2.0 * 0.125);
    }
}
