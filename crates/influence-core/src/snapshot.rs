//! One simulation run's field output.

use ndarray::{Array2, ArrayView2};

use crate::error::{Error, Result};
use crate::grid::Grid;

/// Name under which the scalar magnitude field is reported.
pub const MAGNITUDE: &str = "magnitude";

/// A named `(R, C)` vector component, e.g. `Bx`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedField {
    pub name: String,
    pub values: Array2<f64>,
}

impl NamedField {
    pub fn new(name: impl Into<String>, values: Array2<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Grid, vector components and scalar magnitude of one ensemble member.
///
/// All fields share the grid's shape; [`Snapshot::new`] enforces it.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    grid: Grid,
    components: Vec<NamedField>,
    magnitude: Array2<f64>,
}

impl Snapshot {
    pub fn new(grid: Grid, components: Vec<NamedField>, magnitude: Array2<f64>) -> Result<Self> {
        let (rows, cols) = grid.shape();
        let expected = [rows, cols];
        for field in &components {
            if field.values.dim() != grid.shape() {
                return Err(Error::shape(&expected, field.values.shape()));
            }
            if field.name == MAGNITUDE {
                return Err(Error::config(format!(
                    "component name '{MAGNITUDE}' is reserved for the magnitude field"
                )));
            }
        }
        for (i, field) in components.iter().enumerate() {
            if components[..i].iter().any(|f| f.name == field.name) {
                return Err(Error::config(format!(
                    "duplicate component name '{}'",
                    field.name
                )));
            }
        }
        if magnitude.dim() != grid.shape() {
            return Err(Error::shape(&expected, magnitude.shape()));
        }
        Ok(Self {
            grid,
            components,
            magnitude,
        })
    }

    /// Snapshot whose magnitude is the Euclidean norm of its components.
    pub fn with_norm_magnitude(grid: Grid, components: Vec<NamedField>) -> Result<Self> {
        let mut sq = Array2::<f64>::zeros(grid.shape());
        for field in &components {
            if field.values.dim() != grid.shape() {
                let (rows, cols) = grid.shape();
                return Err(Error::shape(&[rows, cols], field.values.shape()));
            }
            sq.zip_mut_with(&field.values, |acc, &v| *acc += v * v);
        }
        Self::new(grid, components, sq.mapv(f64::sqrt))
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn components(&self) -> &[NamedField] {
        &self.components
    }

    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|f| f.name.as_str())
    }

    pub fn component(&self, name: &str) -> Option<ArrayView2<'_, f64>> {
        self.components
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.values.view())
    }

    pub fn magnitude(&self) -> ArrayView2<'_, f64> {
        self.magnitude.view()
    }

    /// `(rows, cols)` of every field in this snapshot.
    pub fn shape(&self) -> (usize, usize) {
        self.grid.shape()
    }
}
