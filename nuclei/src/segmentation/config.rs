//! Binarizer configuration.

use serde::{Deserialize, Serialize};

use crate::image_proc::thresholding::{odd_block_size, BoundaryMode, LocalMethod};
use crate::image_proc::ProjectionType;

/// What the thresholds are computed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SegmentationMode {
    /// Sum of all depth slices.
    SumProjection,
    /// Maximum over all depth slices.
    MaxProjection,
    /// The full volume.
    #[default]
    ThreeD,
}

impl SegmentationMode {
    pub fn projection(self) -> Option<ProjectionType> {
        match self {
            SegmentationMode::SumProjection => Some(ProjectionType::Sum),
            SegmentationMode::MaxProjection => Some(ProjectionType::Max),
            SegmentationMode::ThreeD => None,
        }
    }
}

/// Component size bounds applied after labeling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeFilter {
    /// Accepted XY radius range; the projected area must lie in
    /// `[π r_min², π r_max²]`.
    pub radius_interval: (f64, f64),
    /// Minimum fraction of the stack depth a component must span.
    pub min_z_fraction: f64,
}

impl Default for SizeFilter {
    fn default() -> Self {
        Self {
            radius_interval: (10.0, f64::INFINITY),
            min_z_fraction: 0.25,
        }
    }
}

impl SizeFilter {
    pub fn area_interval(&self) -> (f64, f64) {
        let (r_min, r_max) = self.radius_interval;
        (
            std::f64::consts::PI * r_min * r_min,
            std::f64::consts::PI * r_max * r_max,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinarizerConfig {
    pub segmentation_mode: SegmentationMode,
    pub do_global: bool,
    pub do_local: bool,
    /// Local neighborhood side; read through [`BinarizerConfig::local_side`].
    pub local_side: usize,
    pub local_method: LocalMethod,
    pub local_mode: BoundaryMode,
    /// Subtracted from the local statistic.
    pub local_offset: f64,
    /// Close the local mask before combining.
    pub local_closing: bool,
    pub clear_xy_borders: bool,
    pub clear_z_borders: bool,
    pub fill_holes: bool,
    /// Dilate-fill-erode iterations, 0 to disable.
    pub dilate_fill_erode: usize,
    pub size_filter: Option<SizeFilter>,
}

impl Default for BinarizerConfig {
    fn default() -> Self {
        Self {
            segmentation_mode: SegmentationMode::default(),
            do_global: true,
            do_local: true,
            local_side: 101,
            local_method: LocalMethod::default(),
            local_mode: BoundaryMode::default(),
            local_offset: 0.0,
            local_closing: true,
            clear_xy_borders: true,
            clear_z_borders: false,
            fill_holes: true,
            dilate_fill_erode: 0,
            size_filter: None,
        }
    }
}

impl BinarizerConfig {
    /// Neighborhood side, bumped to the next odd value when even.
    pub fn local_side(&self) -> usize {
        odd_block_size(self.local_side.max(1))
    }

    pub fn uses_any_threshold(&self) -> bool {
        self.do_global || self.do_local
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_side_becomes_odd() {
        let config = BinarizerConfig {
            local_side: 100,
            ..Default::default()
        };
        assert_eq!(config.local_side(), 101);
        assert_eq!(BinarizerConfig::default().local_side(), 101);
    }

    #[test]
    fn test_area_interval() {
        let filter = SizeFilter {
            radius_interval: (1.0, 2.0),
            min_z_fraction: 0.5,
        };
        let (lo, hi) = filter.area_interval();
        assert!((lo - std::f64::consts::PI).abs() < 1e-12);
        assert!((hi - 4.0 * std::f64::consts::PI).abs() < 1e-12);
    }

    #[test]
    fn test_config_json_roundtrip_with_partial_input() {
        let config: BinarizerConfig =
            serde_json::from_str(r#"{"do_local": false, "local_mode": "Reflect"}"#).unwrap();
        assert!(!config.do_local);
        assert!(config.do_global);
        assert_eq!(config.local_mode, BoundaryMode::Reflect);

        let json = serde_json::to_string(&config).unwrap();
        let back: BinarizerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
