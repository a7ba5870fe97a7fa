//! Intensity rescaling recorded by deconvolution software.
//!
//! Huygens writes a `<basename>_history.txt` next to each deconvolved stack.
//! Every "Stretched to Integer type" line ends with the factor applied to the
//! samples; the overall factor is their product.

use std::fs;
use std::path::{Path, PathBuf};

use super::ImageError;

const STRETCH_NEEDLE: &str = "Stretched to Integer type";

/// Location of the history file describing `raw`.
pub fn history_path(raw: &Path) -> PathBuf {
    let stem = raw
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    raw.with_file_name(format!("{stem}_history.txt"))
}

/// Rescaling factor applied to `raw`, or 1.0 when no history is recorded.
pub fn rescaling_factor(raw: &Path) -> Result<f64, ImageError> {
    let path = history_path(raw);
    if !path.is_file() {
        return Ok(1.0);
    }
    let text = fs::read_to_string(&path).map_err(|source| ImageError::Io {
        path: path.clone(),
        source,
    })?;
    parse_history(&text, &path)
}

fn parse_history(text: &str, path: &Path) -> Result<f64, ImageError> {
    text.lines()
        .filter(|line| line.contains(STRETCH_NEEDLE))
        .try_fold(1.0, |factor, line| {
            line.split_whitespace()
                .last()
                .and_then(|token| token.parse::<f64>().ok())
                .map(|value| factor * value)
                .ok_or_else(|| ImageError::HistoryParse {
                    path: path.to_path_buf(),
                    line: line.trim().to_string(),
                })
        })
}
