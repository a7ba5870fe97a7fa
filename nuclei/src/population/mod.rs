//! Nucleus populations across fields of view.
//!
//! [`NucleiList`] gathers nuclei from mask/raw image pairs, tabulates their
//! features into a [`FeatureTable`], and selects the G1 sub-population by
//! fitting the size and intensity distributions with a [`CellCycleFitter`].

mod field;
mod fit;
mod nuclei_list;
mod table;

use std::path::PathBuf;
use thiserror::Error;

use crate::image::ImageError;
use crate::particle::ParticleError;

pub use field::{
    discover_fields, discover_series, FailurePolicy, FieldOfView, FieldOptions,
    DEFAULT_SERIES_PATTERN,
};
pub use fit::{CellCycleFitter, FitParameters, FitQuality, GaussianComponent, GaussianMixtureFitter};
pub use nuclei_list::NucleiList;
pub use table::{
    ColumnSelection, FeatureRow, FeatureTable, RowSelection, Selection, SelectionDetails,
    DEFAULT_K_SIGMA,
};

/// Why a G1 selection could not be made.
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("no intensity column for channel '{0}'")]
    UnknownChannel(String),
    #[error("no fit could be produced for column '{column}'")]
    FitExhausted { column: String },
    #[error("no range could be derived from the fit of column '{column}'")]
    RangeUnavailable { column: String },
}

#[derive(Error, Debug)]
pub enum PopulationError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error(transparent)]
    Particle(#[from] ParticleError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("table export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("mask prefix and suffix cannot both be empty")]
    EmptyMaskPattern,
    #[error("invalid series pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("series pattern '{0}' must name the groups 'channel' and 'series'")]
    SeriesPattern(String),
    #[error("reference channel '{0}' has no raw image")]
    MissingReferenceChannel(String),
    #[error("raw image {raw} has shape {raw_shape:?} but its mask has shape {mask_shape:?}")]
    FieldShapeMismatch {
        raw: PathBuf,
        raw_shape: Vec<usize>,
        mask_shape: Vec<usize>,
    },
    #[error("field {raw} failed: {source}")]
    Field {
        raw: PathBuf,
        #[source]
        source: Box<PopulationError>,
    },
}
