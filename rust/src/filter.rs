//! Dynamic filter: minimum cumulative incidence per (day, node).
//!
//! Trajectories falling below the threshold at any day-aligned checkpoint
//! are rejected as a whole.

use ndarray::Array2;

use crate::error::{Result, SeirError};

/// Validity gate over trajectories, shared read-only by a whole batch.
#[derive(Clone, Debug)]
pub struct DynamicFilter {
    thresholds: Array2<f64>,
}

impl DynamicFilter {
    /// Build from a (day, node) threshold table.
    pub fn new(thresholds: Array2<f64>, n_nodes: usize) -> Result<Self> {
        if thresholds.ncols() != n_nodes {
            return Err(SeirError::ShapeMismatch {
                what: "dynamic filter",
                expected: (thresholds.nrows(), n_nodes),
                found: thresholds.dim(),
            });
        }
        if thresholds.iter().any(|v| v.is_nan()) {
            return Err(SeirError::config("dynamic filter contains NaN thresholds"));
        }
        Ok(Self { thresholds })
    }

    /// Build from row-major nested vectors (one row per day).
    pub fn from_rows(rows: &[Vec<f64>], n_nodes: usize) -> Result<Self> {
        if let Some(row) = rows.iter().find(|row| row.len() != n_nodes) {
            return Err(SeirError::ShapeMismatch {
                what: "dynamic filter row",
                expected: (1, n_nodes),
                found: (1, row.len()),
            });
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let thresholds = Array2::from_shape_vec((rows.len(), n_nodes), flat)
            .map_err(|e| SeirError::config(format!("dynamic filter: {e}")))?;
        Self::new(thresholds, n_nodes)
    }

    /// Number of days the table constrains.
    pub fn n_days(&self) -> usize {
        self.thresholds.nrows()
    }

    /// Threshold for `node` on `day`; days past the table are unconstrained.
    #[inline]
    pub fn threshold(&self, day: usize, node: usize) -> Option<f64> {
        self.thresholds.get([day, node]).copied()
    }

    /// True when `cumulative_incidence` passes the checkpoint.
    #[inline]
    pub fn accepts(&self, day: usize, node: usize, cumulative_incidence: i64) -> bool {
        match self.threshold(day, node) {
            Some(min) => cumulative_incidence as f64 >= min,
            None => true,
        }
    }
}
