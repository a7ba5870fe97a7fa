//! Axis semantics for image arrays.
//!
//! An [`AxesOrder`] names each dimension of an array with one of the four
//! symbols `T` (time), `Z` (depth), `Y` (row) and `X` (column). Orders are
//! validated on construction: every symbol appears at most once and only
//! known symbols are accepted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ImageError;

/// Canonical axis order, outermost first.
pub const CANONICAL_AXES: &str = "TZYX";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Axis {
    Time,
    Depth,
    Row,
    Column,
}

impl Axis {
    pub fn symbol(self) -> char {
        match self {
            Axis::Time => 'T',
            Axis::Depth => 'Z',
            Axis::Row => 'Y',
            Axis::Column => 'X',
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol.to_ascii_uppercase() {
            'T' => Some(Axis::Time),
            'Z' => Some(Axis::Depth),
            'Y' => Some(Axis::Row),
            'X' => Some(Axis::Column),
            _ => None,
        }
    }

    /// Position of this axis in [`CANONICAL_AXES`].
    pub fn canonical_rank(self) -> usize {
        match self {
            Axis::Time => 0,
            Axis::Depth => 1,
            Axis::Row => 2,
            Axis::Column => 3,
        }
    }
}

/// Ordered, duplicate-free list of axes describing an array's dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AxesOrder(Vec<Axis>);

impl AxesOrder {
    /// Parse an order such as `"ZYX"`.
    pub fn parse(symbols: &str) -> Result<Self, ImageError> {
        if symbols.is_empty() {
            return Err(ImageError::InvalidAxes {
                axes: symbols.to_string(),
                reason: "empty axis order".to_string(),
            });
        }

        let mut axes = Vec::with_capacity(symbols.len());
        for symbol in symbols.chars() {
            let axis = Axis::from_symbol(symbol).ok_or_else(|| ImageError::InvalidAxes {
                axes: symbols.to_string(),
                reason: format!("unknown axis symbol '{symbol}'"),
            })?;
            if axes.contains(&axis) {
                return Err(ImageError::InvalidAxes {
                    axes: symbols.to_string(),
                    reason: format!("axis '{symbol}' appears more than once"),
                });
            }
            axes.push(axis);
        }
        Ok(Self(axes))
    }

    /// The innermost `rank` axes of [`CANONICAL_AXES`], e.g. `ZYX` for rank 3.
    pub fn canonical(rank: usize) -> Result<Self, ImageError> {
        if rank == 0 || rank > CANONICAL_AXES.len() {
            return Err(ImageError::UnsupportedRank { rank });
        }
        Self::parse(&CANONICAL_AXES[CANONICAL_AXES.len() - rank..])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn axes(&self) -> &[Axis] {
        &self.0
    }

    pub fn position(&self, axis: Axis) -> Option<usize> {
        self.0.iter().position(|&a| a == axis)
    }

    pub fn contains(&self, axis: Axis) -> bool {
        self.0.contains(&axis)
    }

    /// True when the axes already appear in canonical relative order.
    pub fn is_canonical(&self) -> bool {
        self.0
            .windows(2)
            .all(|w| w[0].canonical_rank() < w[1].canonical_rank())
    }

    /// Permutation that reorders an array with these axes into canonical
    /// order. Suitable for `ndarray`'s `permuted_axes`.
    pub fn canonical_permutation(&self) -> Vec<usize> {
        let mut permutation: Vec<usize> = (0..self.0.len()).collect();
        permutation.sort_by_key(|&i| self.0[i].canonical_rank());
        permutation
    }

    pub fn to_canonical(&self) -> Self {
        let mut axes = self.0.clone();
        axes.sort_by_key(|a| a.canonical_rank());
        Self(axes)
    }

    /// Drop the leading `count` axes.
    pub fn drop_leading(&self, count: usize) -> Result<Self, ImageError> {
        if count >= self.0.len() {
            return Err(ImageError::UnsupportedRank { rank: 0 });
        }
        Ok(Self(self.0[count..].to_vec()))
    }

    /// Same order with `axis` removed.
    pub fn without(&self, axis: Axis) -> Result<Self, ImageError> {
        let remaining: Vec<Axis> = self.0.iter().copied().filter(|&a| a != axis).collect();
        if remaining.is_empty() {
            return Err(ImageError::UnsupportedRank { rank: 0 });
        }
        Ok(Self(remaining))
    }

    /// Indices of the axes named in `symbols`, e.g. `"YX"`.
    pub fn indices_of(&self, symbols: &str) -> Result<Vec<usize>, ImageError> {
        let wanted = Self::parse(symbols)?;
        wanted
            .axes()
            .iter()
            .map(|&axis| {
                self.position(axis).ok_or_else(|| ImageError::InvalidAxes {
                    axes: symbols.to_string(),
                    reason: format!("axis '{}' not present in '{}'", axis.symbol(), self),
                })
            })
            .collect()
    }
}

impl fmt::Display for AxesOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for axis in &self.0 {
            write!(f, "{}", axis.symbol())?;
        }
        Ok(())
    }
}

impl FromStr for AxesOrder {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for AxesOrder {
    type Error = ImageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AxesOrder> for String {
    fn from(value: AxesOrder) -> Self {
        value.to_string()
    }
}
