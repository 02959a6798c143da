//! Variance and Pearson correlation fields from finalized moments.
//!
//! For reference location `k` at `(r_k, c_k)`:
//!
//! ```text
//! var_x    = E[X²] - E[X]²                      (whole grid)
//! var_y_k  = var_x[r_k, c_k]                    (scalar)
//! cov_k    = E[X·X_ref_k] - E[X] · E[X][r_k, c_k]
//! corr_k   = cov_k / sqrt(var_x · var_y_k)      where the root is > 0, else 0
//! ```
//!
//! Cells that never vary across the ensemble, and reference cells that never
//! vary, yield a correlation of exactly `0` instead of NaN/inf. Results are
//! not clamped into `[-1, 1]`; round-off may push them marginally outside.

use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

use crate::accumulator::Moments;
use crate::error::{Error, Result};
use crate::grid::ReferenceLocations;

/// Correlation and variance fields for one component.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationResult {
    /// Shape `(R, C, L)`; slice `k` belongs to reference location `k`.
    pub correlation: Array3<f64>,
    /// Shape `(R, C)`.
    pub variance: Array2<f64>,
}

impl CorrelationResult {
    /// Correlation map for reference location `k`.
    pub fn for_reference(&self, k: usize) -> Option<ArrayView2<'_, f64>> {
        (k < self.correlation.len_of(Axis(2))).then(|| self.correlation.index_axis(Axis(2), k))
    }
}

/// Relative rounding slack of `E[X²] - E[X]²` per accumulated snapshot.
const VARIANCE_ROUNDING: f64 = 4.0 * f64::EPSILON;

/// Per-cell variance `E[X²] - E[X]²`.
///
/// Differences within the rounding error of the sums
/// (`n · 4ε · E[X²]`) are reported as exactly `0`, so a cell that never
/// varies is never negative and never reaches the correlation divide.
pub fn variance(moments: &Moments) -> Array2<f64> {
    let slack = moments.count.max(1) as f64 * VARIANCE_ROUNDING;
    Zip::from(&moments.mean_sq)
        .and(&moments.mean)
        .map_collect(|&sq, &m| {
            let var = sq - m * m;
            if var <= slack * sq.abs() { 0.0 } else { var }
        })
}

/// Derive variance and per-reference correlation fields.
pub fn compute(moments: &Moments, refs: &ReferenceLocations) -> Result<CorrelationResult> {
    let shape = moments.mean.dim();
    if moments.mean_sq.dim() != shape {
        return Err(Error::shape(moments.mean.shape(), moments.mean_sq.shape()));
    }
    let expected = [shape.0, shape.1, refs.len()];
    if moments.cross.shape() != expected {
        return Err(Error::shape(&expected, moments.cross.shape()));
    }
    refs.validate(shape)?;

    let var_x = variance(moments);
    let mut correlation = Array3::zeros(expected);

    for (k, cell) in refs.iter().enumerate() {
        let var_y = var_x[cell.ix()];
        let mean_y = moments.mean[cell.ix()];
        if var_y <= 0.0 {
            log::warn!(
                "reference location #{k} {cell} has no variance across {} snapshots; its correlation map is zero",
                moments.count
            );
        }

        Zip::from(correlation.index_axis_mut(Axis(2), k))
            .and(moments.cross.index_axis(Axis(2), k))
            .and(&moments.mean)
            .and(&var_x)
            .for_each(|out, &exy, &mean_x, &vx| {
                let denom = (vx * var_y).sqrt();
                *out = if denom > 0.0 && denom.is_finite() {
                    (exy - mean_x * mean_y) / denom
                } else {
                    0.0
                };
            });
    }

    Ok(CorrelationResult {
        correlation,
        variance: var_x,
    })
}

// ---------------------------------------------------------------------------
// Significance
// ---------------------------------------------------------------------------

/// Critical `|r|` for a two-sided test of zero correlation at level `alpha`
/// over an ensemble of `n` members.
///
/// Uses `t = r·sqrt((n-2)/(1-r²))` with `n - 2` degrees of freedom, solved for
/// `r` at the `1 - alpha/2` quantile.
pub fn significance_threshold(n: usize, alpha: f64) -> Result<f64> {
    if n < 3 {
        return Err(Error::config(format!(
            "significance needs at least 3 ensemble members, got {n}"
        )));
    }
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(Error::config(format!("alpha must lie in (0, 1), got {alpha}")));
    }
    let dof = (n - 2) as f64;
    let dist = StudentsT::new(0.0, 1.0, dof)
        .map_err(|e| Error::config(format!("invalid t distribution: {e}")))?;
    let t = dist.inverse_cdf(1.0 - alpha / 2.0);
    Ok(t / (dof + t * t).sqrt())
}

/// Compact description of one correlation map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationSummary {
    pub min: f64,
    pub max: f64,
    pub mean_abs: f64,
    /// Fraction of cells with `|r|` strictly above `threshold`.
    pub fraction_above: f64,
    pub threshold: f64,
}

impl CorrelationSummary {
    pub fn from_map(map: ArrayView2<'_, f64>, threshold: f64) -> Self {
        let n = map.len().max(1) as f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut abs_sum = 0.0;
        let mut above = 0usize;
        for &r in map.iter() {
            min = min.min(r);
            max = max.max(r);
            abs_sum += r.abs();
            if r.abs() > threshold {
                above += 1;
            }
        }
        if map.is_empty() {
            min = 0.0;
            max = 0.0;
        }
        Self {
            min,
            max,
            mean_abs: abs_sum / n,
            fraction_above: above as f64 / n,
            threshold,
        }
    }
}
