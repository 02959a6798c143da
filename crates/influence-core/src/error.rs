//! Error types shared across the crate.

use thiserror::Error;

/// Convenience alias used throughout `influence-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures that abort an analysis run.
///
/// Zero-variance cells are not represented here: they resolve to a
/// correlation of `0` and the run continues.
#[derive(Debug, Error)]
pub enum Error {
    /// The run was set up in a way that cannot produce a result
    /// (empty ensemble, no reference locations, out-of-range cells, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A field's shape disagrees with the grid established by the first snapshot.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// A snapshot carries a different set of named components than the first one.
    #[error("component mismatch: expected {expected:?}, found {found:?}")]
    ComponentMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot or result file could not be decoded.
    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn shape(expected: &[usize], found: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            found: found.to_vec(),
        }
    }
}
