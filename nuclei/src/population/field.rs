//! Fields of view: raw intensity images paired with their masks.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::PopulationError;
use crate::report::Reporter;

const TIFF_EXTENSIONS: [&str; 2] = ["tif", "tiff"];

/// Matches `<channel>_<series>.tif`, e.g. `dapi_001.tif`.
pub const DEFAULT_SERIES_PATTERN: &str = r"^(?P<channel>[^/]+)_(?P<series>[0-9]+)\.tiff?$";

/// One raw image and the mask segmenting it, plus any further channels
/// imaged in the same field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldOfView {
    /// Raw image of the reference channel. Nuclei take it as their source.
    pub raw: PathBuf,
    pub mask: PathBuf,
    /// Name of the reference channel; `None` stores its features under
    /// [`FieldOptions::channel`].
    pub reference: Option<String>,
    /// Raw images of the other channels, by name.
    pub channels: BTreeMap<String, PathBuf>,
}

impl FieldOfView {
    pub fn new(raw: impl Into<PathBuf>, mask: impl Into<PathBuf>) -> Self {
        Self {
            raw: raw.into(),
            mask: mask.into(),
            reference: None,
            channels: BTreeMap::new(),
        }
    }

    /// A field whose mask segments the `reference` entry of `channels`.
    pub fn with_channels(
        reference: &str,
        mut channels: BTreeMap<String, PathBuf>,
        mask: impl Into<PathBuf>,
    ) -> Result<Self, PopulationError> {
        let raw = channels
            .remove(reference)
            .ok_or_else(|| PopulationError::MissingReferenceChannel(reference.to_string()))?;
        Ok(Self {
            raw,
            mask: mask.into(),
            reference: Some(reference.to_string()),
            channels,
        })
    }

    /// Every channel as `(name, raw path)`, reference first.
    pub fn channel_paths<'a>(&'a self, default_name: &'a str) -> Vec<(&'a str, &'a Path)> {
        let reference = self.reference.as_deref().unwrap_or(default_name);
        std::iter::once((reference, self.raw.as_path()))
            .chain(
                self.channels
                    .iter()
                    .map(|(name, path)| (name.as_str(), path.as_path())),
            )
            .collect()
    }
}

/// What happens to a batch when one field fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// The first failing field (in input order) fails the batch.
    #[default]
    AbortBatch,
    /// Failing fields are reported and left out.
    SkipField,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldOptions {
    /// Name the reference channel's features are stored under when the
    /// field does not name it.
    pub channel: String,
    /// Divide raw samples by the Huygens rescaling factor.
    pub do_rescale: bool,
    /// Masks already carry labels; otherwise they are relabeled.
    pub labeled_masks: bool,
    /// Worker threads; 1 runs sequentially with a progress bar.
    pub threads: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            channel: "unknown".to_string(),
            do_rescale: true,
            labeled_masks: false,
            threads: 1,
            failure_policy: FailurePolicy::default(),
        }
    }
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| TIFF_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Sorted names of the TIFF files directly inside `dir`.
fn tiff_names(dir: &Path) -> Result<Vec<String>, PopulationError> {
    let io_error = |source| PopulationError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut names: Vec<String> = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        if path.is_file() && is_tiff(&path) {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Mask naming `<prefix><raw-stem><suffix>.<ext>`, with `.` separators
/// added when missing.
struct MaskPattern {
    prefix: String,
    suffix: String,
}

impl MaskPattern {
    fn new(mask_prefix: &str, mask_suffix: &str) -> Result<Self, PopulationError> {
        if mask_prefix.is_empty() && mask_suffix.is_empty() {
            return Err(PopulationError::EmptyMaskPattern);
        }
        let prefix = match mask_prefix {
            "" => String::new(),
            p if p.ends_with('.') => p.to_string(),
            p => format!("{p}."),
        };
        let suffix = match mask_suffix {
            "" => String::new(),
            s if s.starts_with('.') => s.to_string(),
            s => format!(".{s}"),
        };
        Ok(Self { prefix, suffix })
    }

    fn mask_of(&self, raw: &str) -> Option<String> {
        let (stem, ext) = raw.rsplit_once('.')?;
        Some(format!("{}{stem}{}.{ext}", self.prefix, self.suffix))
    }

    /// The raw name a mask segments, or `None` for non-mask names.
    fn raw_of(&self, name: &str) -> Option<String> {
        let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
        let inner = stem
            .strip_prefix(self.prefix.as_str())?
            .strip_suffix(self.suffix.as_str())?;
        if inner.is_empty() {
            return None;
        }
        Some(format!("{inner}.{ext}"))
    }
}

/// Pair every TIFF in `dir` with its mask `<prefix>.<stem>.<suffix>.<ext>`.
///
/// The `.` separators are added when missing, so a suffix of `"mask"` pairs
/// `dapi_001.tif` with `dapi_001.mask.tif`. Masks themselves are never
/// treated as raw images. The result is sorted by raw file name.
pub fn discover_fields(
    dir: impl AsRef<Path>,
    mask_prefix: &str,
    mask_suffix: &str,
) -> Result<Vec<FieldOfView>, PopulationError> {
    let dir = dir.as_ref();
    let pattern = MaskPattern::new(mask_prefix, mask_suffix)?;
    let names = tiff_names(dir)?;

    Ok(names
        .iter()
        .filter(|name| pattern.raw_of(name).is_none())
        .filter_map(|name| {
            let mask = pattern.mask_of(name)?;
            names
                .binary_search(&mask)
                .ok()
                .map(|_| FieldOfView::new(dir.join(name), dir.join(mask)))
        })
        .collect())
}

/// Group the TIFFs in `dir` into multi-channel fields.
///
/// `pattern` must name two groups: `channel` and `series`. Files sharing a
/// series form one field; only the mask of the `reference` channel is
/// used, other masks are reported and ignored. Series without a reference
/// image or mask are reported and left out. Fields are sorted by series.
pub fn discover_series(
    dir: impl AsRef<Path>,
    pattern: &str,
    reference: &str,
    mask_prefix: &str,
    mask_suffix: &str,
    reporter: &dyn Reporter,
) -> Result<Vec<FieldOfView>, PopulationError> {
    let dir = dir.as_ref();
    let regex = Regex::new(pattern)?;
    let has_group = |group: &str| regex.capture_names().flatten().any(|n| n == group);
    if !has_group("channel") || !has_group("series") {
        return Err(PopulationError::SeriesPattern(pattern.to_string()));
    }
    let masks = MaskPattern::new(mask_prefix, mask_suffix)?;
    let details = |name: &str| {
        let captures = regex.captures(name)?;
        let series = captures.name("series")?.as_str().to_string();
        let channel = captures.name("channel")?.as_str().to_string();
        Some((series, channel))
    };

    let mut channels: BTreeMap<String, BTreeMap<String, PathBuf>> = BTreeMap::new();
    let mut mask_paths: BTreeMap<String, PathBuf> = BTreeMap::new();
    for name in tiff_names(dir)? {
        if let Some(raw) = masks.raw_of(&name) {
            let Some((series, channel)) = details(raw.as_str()) else {
                continue;
            };
            if channel != reference {
                reporter.warn(&format!(
                    "skipping mask for channel '{channel}', not reference ({reference})"
                ));
            } else if mask_paths.insert(series.clone(), dir.join(&name)).is_some() {
                reporter.warn(&format!(
                    "found multiple masks for reference channel in series {series}"
                ));
            }
            continue;
        }
        let Some((series, channel)) = details(name.as_str()) else {
            continue;
        };
        let series_channels = channels.entry(series.clone()).or_default();
        if series_channels.contains_key(&channel) {
            reporter.warn(&format!(
                "found multiple instances of channel {channel} in series {series}, \
                 skipping '{name}'"
            ));
            continue;
        }
        series_channels.insert(channel, dir.join(&name));
    }

    let counts: Vec<usize> = channels.values().map(BTreeMap::len).collect();
    if counts.windows(2).any(|w| w[0] != w[1]) {
        reporter.warn("inconsistent number of channels across series");
    }

    let mut fields: Vec<(String, FieldOfView)> = Vec::with_capacity(channels.len());
    for (series, series_channels) in channels {
        let Some(mask) = mask_paths.remove(&series) else {
            reporter.warn(&format!(
                "missing mask of reference channel '{reference}' for series '{series}'"
            ));
            continue;
        };
        match FieldOfView::with_channels(reference, series_channels, mask) {
            Ok(field) => fields.push((series, field)),
            Err(e) => reporter.warn(&format!("skipping series '{series}': {e}")),
        }
    }
    fields.sort_by_key(|(series, _)| (series.parse::<u64>().ok(), series.clone()));
    Ok(fields.into_iter().map(|(_, field)| field).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RecordingReporter;
    use log::Level;

    #[test]
    fn test_discover_pairs_by_suffix() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "b.tif",
            "b.mask.tif",
            "a.tif",
            "a.mask.tif",
            "orphan.tif",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let fields = discover_fields(dir.path(), "", "mask").unwrap();
        assert_eq!(
            fields,
            vec![
                FieldOfView::new(dir.path().join("a.tif"), dir.path().join("a.mask.tif")),
                FieldOfView::new(dir.path().join("b.tif"), dir.path().join("b.mask.tif")),
            ]
        );
    }

    #[test]
    fn test_discover_pairs_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["dapi_1.tiff", "seg.dapi_1.tiff"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let fields = discover_fields(dir.path(), "seg.", "").unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].mask, dir.path().join("seg.dapi_1.tiff"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_fields(dir.path(), "", ""),
            Err(PopulationError::EmptyMaskPattern)
        ));
    }

    #[test]
    fn test_discover_series_groups_channels() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "dapi_001.tif",
            "lamin_001.tif",
            "dapi_001.mask.tif",
            "lamin_001.mask.tif",
            "dapi_002.tif",
            "lamin_002.tif",
            "lamin_003.tif",
            "dapi_003.tif",
            "notes_a.tif",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::write(dir.path().join("dapi_002.mask.tif"), b"").unwrap();
        let reporter = RecordingReporter::new();
        let fields = discover_series(
            dir.path(),
            DEFAULT_SERIES_PATTERN,
            "dapi",
            "",
            "mask",
            &reporter,
        )
        .unwrap();

        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].raw, dir.path().join("dapi_001.tif"));
        assert_eq!(fields[0].mask, dir.path().join("dapi_001.mask.tif"));
        assert_eq!(fields[0].reference.as_deref(), Some("dapi"));
        assert_eq!(
            fields[1].channel_paths("unused"),
            vec![
                ("dapi", dir.path().join("dapi_002.tif").as_path()),
                ("lamin", dir.path().join("lamin_002.tif").as_path()),
            ]
        );
        assert!(reporter.contains(Level::Warn, "skipping mask for channel 'lamin'"));
        assert!(reporter.contains(Level::Warn, "for series '003'"));
    }

    #[test]
    fn test_series_pattern_needs_named_groups() {
        let dir = tempfile::tempdir().unwrap();
        let result = discover_series(
            dir.path(),
            r"^(?P<channel>.+)\.tif$",
            "dapi",
            "",
            "mask",
            &RecordingReporter::new(),
        );
        assert!(matches!(result, Err(PopulationError::SeriesPattern(_))));
        let reporter = RecordingReporter::new();
        let result = discover_series(dir.path(), "(", "dapi", "", "mask", &reporter);
        assert!(matches!(result, Err(PopulationError::Pattern(_))));
    }

    #[test]
    fn test_with_channels_requires_reference() {
        let channels = BTreeMap::from([("lamin".to_string(), PathBuf::from("lamin_1.tif"))]);
        assert!(matches!(
            FieldOfView::with_channels("dapi", channels, "dapi_1.mask.tif"),
            Err(PopulationError::MissingReferenceChannel(_))
        ));
        let single = FieldOfView::new("a.tif", "a.mask.tif");
        assert_eq!(
            single.channel_paths("dapi"),
            vec![("dapi", Path::new("a.tif"))]
        );
    }

    #[test]
    fn test_options_defaults() {
        let options: FieldOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, FieldOptions::default());
        assert_eq!(options.channel, "unknown");
        assert!(options.do_rescale);
        assert_eq!(options.failure_policy, FailurePolicy::AbortBatch);
    }
}
