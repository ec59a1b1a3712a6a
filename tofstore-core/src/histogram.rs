//! Bin edges and dense histogram types.

use crate::error::{Error, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Validated, non-decreasing, non-negative histogram bin boundaries.
///
/// The fingerprint is computed once on construction and identifies the
/// binning in the histogram cache; cache hits are confirmed against the
/// full edge values.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct BinEdges {
    edges: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(skip))]
    fingerprint: u64,
}

impl BinEdges {
    /// Creates bin edges from boundary values.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if any edge is negative or not
    /// finite, or if the edges decrease.
    pub fn new(edges: Vec<f64>) -> Result<Self> {
        check_bin_edges(&edges)?;
        Ok(Self::from_validated(edges))
    }

    /// Creates `num_bins` equal-width bins spanning `[start, stop]`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `num_bins` is 0 or the range
    /// is invalid.
    #[allow(clippy::cast_precision_loss)]
    pub fn linear(start: f64, stop: f64, num_bins: usize) -> Result<Self> {
        if num_bins == 0 {
            return Err(Error::InvalidArgument(
                "at least one bin is required".to_string(),
            ));
        }
        if stop < start {
            return Err(Error::InvalidArgument(format!(
                "bin range stop {stop} is below start {start}"
            )));
        }
        let width = (stop - start) / num_bins as f64;
        let mut edges: Vec<f64> = (0..num_bins).map(|i| start + width * i as f64).collect();
        edges.push(stop);
        Self::new(edges)
    }

    /// Placeholder binning used for freshly initialised lists: one bin from
    /// zero to the smallest positive double.
    #[must_use]
    pub fn placeholder() -> Self {
        Self::from_validated(vec![0.0, f64::MIN_POSITIVE])
    }

    fn from_validated(edges: Vec<f64>) -> Self {
        let mut hasher = DefaultHasher::new();
        edges.len().hash(&mut hasher);
        for edge in &edges {
            edge.to_bits().hash(&mut hasher);
        }
        Self {
            fingerprint: hasher.finish(),
            edges,
        }
    }

    /// Number of bins described by these edges.
    #[must_use]
    pub fn num_bins(&self) -> usize {
        self.edges.len().saturating_sub(1)
    }

    /// Hash of the edge values used as the cache binning key.
    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Consumes the edges, returning the raw boundaries.
    #[must_use]
    pub fn into_vec(self) -> Vec<f64> {
        self.edges
    }
}

impl Deref for BinEdges {
    type Target = [f64];

    fn deref(&self) -> &Self::Target {
        &self.edges
    }
}

impl TryFrom<Vec<f64>> for BinEdges {
    type Error = Error;

    fn try_from(edges: Vec<f64>) -> Result<Self> {
        Self::new(edges)
    }
}

/// Dense histogram counts (`y`) and errors (`e`).
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Histogram {
    /// Summed weight per bin.
    pub y: Vec<f64>,
    /// Error per bin, `sqrt(sum(error^2))`; all zero when errors were skipped.
    pub e: Vec<f64>,
}

impl Histogram {
    /// Creates a zeroed histogram with `num_bins` bins.
    #[must_use]
    pub fn zeros(num_bins: usize) -> Self {
        Self {
            y: vec![0.0; num_bins],
            e: vec![0.0; num_bins],
        }
    }

    /// Number of bins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.y.len()
    }

    /// Returns true if the histogram has no bins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Sum of all bin values.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.y.iter().sum()
    }
}

/// Index of the bin containing `x`, or `None` if `x` lies outside
/// `[edges[0], edges[last])`.
#[inline]
pub(crate) fn find_bin(edges: &[f64], x: f64) -> Option<usize> {
    let (&first, &last) = (edges.first()?, edges.last()?);
    if edges.len() < 2 || !(x >= first && x < last) {
        return None;
    }
    // first edge strictly greater than x; x >= first so the result is >= 1
    let upper = edges.partition_point(|&edge| edge <= x);
    Some(upper - 1)
}

/// Validates that `x` describes the bins of `y` and `e`.
/// Checks that `edges` are finite, non-negative and non-decreasing.
pub(crate) fn check_bin_edges(edges: &[f64]) -> Result<()> {
    if let Some(bad) = edges.iter().find(|x| !x.is_finite() || **x < 0.0) {
        return Err(Error::InvalidArgument(format!(
            "bin edges must be finite and non-negative, got {bad}"
        )));
    }
    if edges.windows(2).any(|w| w[1] < w[0]) {
        return Err(Error::InvalidArgument(
            "bin edges must be non-decreasing".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_histogram_shape(x: &[f64], y: &[f64], e: &[f64]) -> Result<()> {
    if x.len() != y.len() + 1 || y.len() != e.len() {
        return Err(Error::InvalidArgument(format!(
            "histogram shape mismatch: {} edges, {} values, {} errors",
            x.len(),
            y.len(),
            e.len()
        )));
    }
    Ok(())
}
