//! # influence-core
//!
//! **Which parts of the domain move together with this point?**
//!
//! `influence-core` analyzes an ensemble of simulated spatial fields (one
//! snapshot per perturbed run, all on the same 2D grid) and computes, for a
//! set of reference cells, the Pearson correlation between every cell and
//! the reference across the ensemble: the *domain of influence*.
//!
//! ## Quick Start
//!
//! ```no_run
//! use influence_core::{ReferenceLocations, SnapshotDirectory, run};
//!
//! let refs = ReferenceLocations::try_from(vec![(10, 20), (30, 5)])?;
//! let ensemble = SnapshotDirectory::open_default("ensembles/pdyn")?;
//! let result = run(ensemble, &refs)?;
//!
//! for (name, field) in result.fields() {
//!     println!("{name}: r at first reference = {:.3}", field.correlation[(10, 20, 0)]);
//! }
//! # Ok::<(), influence_core::Error>(())
//! ```
//!
//! ## Architecture
//!
//! Snapshot source → [`EnsembleAccumulator`] → one [`MomentAccumulator`] per
//! component → [`Moments`] → [`correlation::compute`] → [`EnsembleResult`]
//!
//! The statistics engine ([`accumulator`], [`correlation`], [`ensemble`])
//! does no I/O. It consumes any iterator of `Result<Snapshot>`, one
//! snapshot at a time. [`source`] and [`store`] provide the on-disk
//! snapshot format and run persistence used by the CLI.

pub mod accumulator;
pub mod correlation;
pub mod ensemble;
pub mod error;
pub mod grid;
pub mod snapshot;
pub mod source;
pub mod store;

pub use accumulator::{MomentAccumulator, MomentSums, Moments};
pub use correlation::{
    CorrelationResult, CorrelationSummary, compute, significance_threshold, variance,
};
pub use ensemble::{
    ComponentField, DEFAULT_PARALLEL_MIN_CELLS, EnsembleAccumulator, EnsembleOptions,
    EnsembleResult, run, run_with,
};
pub use error::{Error, Result};
pub use grid::{CellIndex, Grid, ReferenceLocations};
pub use snapshot::{MAGNITUDE, NamedField, Snapshot};
pub use source::{DEFAULT_MARKER, SnapshotDirectory, read_snapshot, write_snapshot};
pub use store::{RunConfig, RunManifest, load_manifest, write_run};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
