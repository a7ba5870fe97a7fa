//! Per-nucleus feature tables and G1 selection.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::fit::{CellCycleFitter, FitParameters, FitQuality};
use super::{PopulationError, SelectionError};
use crate::report::Reporter;

pub const DEFAULT_K_SIGMA: f64 = 2.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Source image of the nucleus.
    pub image: String,
    pub label: u32,
    /// Voxel count.
    pub size: usize,
    /// Intensity sum per channel.
    pub isum: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSelection {
    pub pass_size: bool,
    pub pass_isum: bool,
    pub pass: bool,
}

/// Selection flags of every row, and the channel they were computed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub reference: String,
    pub rows: Vec<RowSelection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSelection {
    pub range: (f64, f64),
    pub fit: FitParameters,
}

/// Fitted ranges and parameters behind a G1 selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionDetails {
    pub size: ColumnSelection,
    pub isum: ColumnSelection,
}

/// Columns: `image`, `label`, `size`, one `isum_<channel>` per channel seen
/// on any row (sorted), and after a selection `pass_size`, `pass_isum`,
/// `pass`, `ref`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureTable {
    channels: Vec<String>,
    rows: Vec<FeatureRow>,
    selection: Option<Selection>,
}

fn isum_column(channel: &str) -> String {
    format!("isum_{channel}")
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

impl FeatureTable {
    pub fn new(rows: Vec<FeatureRow>) -> Self {
        let channels: BTreeSet<String> = rows.iter().flat_map(|r| r.isum.keys().cloned()).collect();
        Self {
            channels: channels.into_iter().collect(),
            rows,
            selection: None,
        }
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn columns(&self) -> Vec<String> {
        let mut columns = vec!["image".to_string(), "label".to_string(), "size".to_string()];
        columns.extend(self.channels.iter().map(|c| isum_column(c)));
        if self.selection.is_some() {
            columns.extend(["pass_size", "pass_isum", "pass", "ref"].map(String::from));
        }
        columns
    }

    pub fn sizes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.size as f64).collect()
    }

    /// Intensity sums of `channel`, NaN on rows without it. `None` when no
    /// row has the channel.
    pub fn intensity_sums(&self, channel: &str) -> Option<Vec<f64>> {
        if !self.channels.iter().any(|c| c == channel) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(|r| r.isum.get(channel).copied().unwrap_or(f64::NAN))
                .collect(),
        )
    }

    /// Select G1 nuclei: rows whose size and `channel` intensity sum both
    /// fall within `k_sigma` of their fitted peaks.
    ///
    /// # Arguments
    /// * `k_sigma` - Half-width of the acceptance ranges, in fitted sigmas
    /// * `channel` - Channel whose intensity sums are fitted
    /// * `fitter` - Distribution model for both columns
    /// * `reporter` - Receives fit diagnostics and fallback warnings
    ///
    /// # Returns
    /// The table with selection columns, and the ranges and fits used.
    pub fn select_g1(
        &self,
        k_sigma: f64,
        channel: &str,
        fitter: &dyn CellCycleFitter,
        reporter: &dyn Reporter,
    ) -> Result<(FeatureTable, SelectionDetails), SelectionError> {
        let isums = self
            .intensity_sums(channel)
            .ok_or_else(|| SelectionError::UnknownChannel(channel.to_string()))?;
        let sizes = self.sizes();

        let size = select_column("size", &sizes, k_sigma, fitter, reporter)?;
        let isum = select_column(&isum_column(channel), &isums, k_sigma, fitter, reporter)?;

        let within = |v: f64, (lo, hi): (f64, f64)| v >= lo && v <= hi;
        let rows = sizes
            .iter()
            .zip(&isums)
            .map(|(&s, &i)| {
                let pass_size = within(s, size.range);
                let pass_isum = within(i, isum.range);
                RowSelection {
                    pass_size,
                    pass_isum,
                    pass: pass_size && pass_isum,
                }
            })
            .collect();

        let mut table = self.clone();
        table.selection = Some(Selection {
            reference: channel.to_string(),
            rows,
        });
        Ok((table, SelectionDetails { size, isum }))
    }

    /// Write the table as tab-separated values with a header row.
    pub fn write_tsv<W: Write>(&self, writer: W) -> Result<(), PopulationError> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);
        wtr.write_record(self.columns())?;

        for (index, row) in self.rows.iter().enumerate() {
            let mut record = vec![row.image.clone(), row.label.to_string(), row.size.to_string()];
            record.extend(self.channels.iter().map(|c| {
                format_value(row.isum.get(c).copied().unwrap_or(f64::NAN))
            }));
            if let Some(selection) = &self.selection {
                if let Some(flags) = selection.rows.get(index) {
                    record.push(flags.pass_size.to_string());
                    record.push(flags.pass_isum.to_string());
                    record.push(flags.pass.to_string());
                    record.push(selection.reference.clone());
                }
            }
            wtr.write_record(&record)?;
        }

        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    pub fn save_tsv(&self, path: impl AsRef<Path>) -> Result<(), PopulationError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| PopulationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.write_tsv(file)
    }
}

fn select_column(
    column: &str,
    values: &[f64],
    k_sigma: f64,
    fitter: &dyn CellCycleFitter,
    reporter: &dyn Reporter,
) -> Result<ColumnSelection, SelectionError> {
    let fit = fitter
        .fit(values)
        .ok_or_else(|| SelectionError::FitExhausted {
            column: column.to_string(),
        })?;
    if fit.quality == FitQuality::OneComponent {
        reporter.warn(&format!(
            "two-component fit of '{column}' failed, using a single Gaussian"
        ));
    }
    let range = fitter
        .range_from_fit(values, &fit, k_sigma)
        .ok_or_else(|| SelectionError::RangeUnavailable {
            column: column.to_string(),
        })?;
    reporter.info(&format!("{column} fit: {:?}", fit.components));
    reporter.info(&format!("{column} range: [{:.2}, {:.2}]", range.0, range.1));
    Ok(ColumnSelection { range, fit })
}
