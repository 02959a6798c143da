//! Shared spatial grid and reference-location bookkeeping.
//!
//! Every snapshot in an ensemble lives on the same `(R, C)` grid. Reference
//! locations are plain `(row, col)` indices into that grid; this module also
//! translates user-facing positions (fractions of the domain or physical
//! coordinates) into cells.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Cells and reference locations
// ---------------------------------------------------------------------------

/// A `(row, col)` grid index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIndex {
    pub row: usize,
    pub col: usize,
}

impl CellIndex {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Index tuple in ndarray order.
    pub fn ix(self) -> (usize, usize) {
        (self.row, self.col)
    }
}

impl std::fmt::Display for CellIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Ordered, non-empty set of reference cells.
///
/// The position of a cell in this list is the index into the third axis of
/// every correlation field produced for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CellIndex>")]
pub struct ReferenceLocations(Vec<CellIndex>);

impl ReferenceLocations {
    pub fn new(cells: Vec<CellIndex>) -> Result<Self> {
        if cells.is_empty() {
            return Err(Error::config("at least one reference location is required"));
        }
        Ok(Self(cells))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false: construction and deserialization reject empty lists.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = CellIndex> + '_ {
        self.0.iter().copied()
    }

    pub fn as_slice(&self) -> &[CellIndex] {
        &self.0
    }

    /// Check every cell against a grid shape.
    pub fn validate(&self, shape: (usize, usize)) -> Result<()> {
        for (k, cell) in self.iter().enumerate() {
            if cell.row >= shape.0 || cell.col >= shape.1 {
                return Err(Error::config(format!(
                    "reference location #{k} {cell} lies outside the {}x{} grid",
                    shape.0, shape.1
                )));
            }
        }
        Ok(())
    }
}

impl TryFrom<Vec<CellIndex>> for ReferenceLocations {
    type Error = Error;

    fn try_from(cells: Vec<CellIndex>) -> Result<Self> {
        Self::new(cells)
    }
}

impl TryFrom<Vec<(usize, usize)>> for ReferenceLocations {
    type Error = Error;

    fn try_from(pairs: Vec<(usize, usize)>) -> Result<Self> {
        Self::new(pairs.into_iter().map(|(r, c)| CellIndex::new(r, c)).collect())
    }
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// Physical coordinates of every cell, shape `(R, C)` for each axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grid {
    x: Array2<f64>,
    y: Array2<f64>,
    z: Array2<f64>,
}

impl Grid {
    pub fn new(x: Array2<f64>, y: Array2<f64>, z: Array2<f64>) -> Result<Self> {
        if y.dim() != x.dim() {
            return Err(Error::shape(x.shape(), y.shape()));
        }
        if z.dim() != x.dim() {
            return Err(Error::shape(x.shape(), z.shape()));
        }
        if x.is_empty() {
            return Err(Error::config("grid has no cells"));
        }
        Ok(Self { x, y, z })
    }

    /// `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        self.x.dim()
    }

    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array2<f64> {
        &self.y
    }

    pub fn z(&self) -> &Array2<f64> {
        &self.z
    }

    pub fn contains(&self, cell: CellIndex) -> bool {
        let (rows, cols) = self.shape();
        cell.row < rows && cell.col < cols
    }

    /// Map a fractional position across the domain to a cell.
    ///
    /// `fx` selects the column (`⌊C·fx⌋`) and `fz` the row (`⌊R·fz⌋`); both
    /// must lie in `[0, 1)`.
    pub fn cell_at_fraction(&self, fx: f64, fz: f64) -> Result<CellIndex> {
        for (name, f) in [("x", fx), ("z", fz)] {
            if !(0.0..1.0).contains(&f) {
                return Err(Error::config(format!(
                    "fractional {name} position {f} is outside [0, 1)"
                )));
            }
        }
        let (rows, cols) = self.shape();
        Ok(CellIndex::new(
            (rows as f64 * fz) as usize,
            (cols as f64 * fx) as usize,
        ))
    }

    /// Cell whose `(x, z)` coordinates are closest to the given point.
    pub fn nearest_cell(&self, x: f64, z: f64) -> Result<CellIndex> {
        if !x.is_finite() || !z.is_finite() {
            return Err(Error::config(format!("non-finite position ({x}, {z})")));
        }
        let mut best: Option<(CellIndex, f64)> = None;
        for ((row, col), &cx) in self.x.indexed_iter() {
            let cz = self.z[(row, col)];
            let d2 = (cx - x).powi(2) + (cz - z).powi(2);
            if !d2.is_finite() {
                continue;
            }
            if best.is_none_or(|(_, b)| d2 < b) {
                best = Some((CellIndex::new(row, col), d2));
            }
        }
        best.map(|(cell, _)| cell)
            .ok_or_else(|| Error::config("grid has no finite coordinates"))
    }

    /// Physical `(x, z)` of a cell rounded to two decimals, for labelling.
    pub fn position(&self, cell: CellIndex) -> Option<(f64, f64)> {
        if !self.contains(cell) {
            return None;
        }
        let round = |v: f64| (v * 100.0).round() / 100.0;
        Some((round(self.x[cell.ix()]), round(self.z[cell.ix()])))
    }
}
