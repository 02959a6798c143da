//! Ensemble orchestration: one accumulator per tracked component.
//!
//! Snapshots are pulled from the source one at a time and folded into an
//! independent [`MomentAccumulator`] per component name, plus one for the
//! magnitude field. Once the source is exhausted every accumulator is
//! finalized and resolved into correlation and variance fields.
//!
//! The first snapshot fixes the grid shape and the component names; any
//! later disagreement aborts the run. There is no partial-result mode.

use std::collections::BTreeMap;

use ndarray::{Array2, Array3, ArrayView2};

use crate::accumulator::MomentAccumulator;
use crate::correlation;
use crate::error::{Error, Result};
use crate::grid::{Grid, ReferenceLocations};
use crate::snapshot::{MAGNITUDE, Snapshot};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Grid size below which `parallel` runs stay on the calling thread.
pub const DEFAULT_PARALLEL_MIN_CELLS: usize = 16_384;

/// Knobs for one analysis run.
#[derive(Debug, Clone)]
pub struct EnsembleOptions {
    /// Component names to track; `None` tracks every component of the first
    /// snapshot. The magnitude field is always tracked.
    pub components: Option<Vec<String>>,
    /// Update each component's accumulator on its own thread.
    ///
    /// Threads are spawned per snapshot, one per tracked component plus the
    /// magnitude. On small grids that spawn cost outweighs the update itself,
    /// so fan-out only happens for grids of at least `parallel_min_cells`.
    pub parallel: bool,
    pub parallel_min_cells: usize,
}

impl Default for EnsembleOptions {
    fn default() -> Self {
        Self {
            components: None,
            parallel: false,
            parallel_min_cells: DEFAULT_PARALLEL_MIN_CELLS,
        }
    }
}

impl EnsembleOptions {
    /// Whether a snapshot of `cells` cells feeding `jobs` accumulators is
    /// updated on scoped threads.
    fn fans_out(&self, cells: usize, jobs: usize) -> bool {
        self.parallel && jobs > 1 && cells >= self.parallel_min_cells
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Statistics of one component over the ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentField {
    /// `E[X]`, shape `(R, C)`.
    pub mean: Array2<f64>,
    /// `Var[X]`, shape `(R, C)`.
    pub variance: Array2<f64>,
    /// Shape `(R, C, L)`.
    pub correlation: Array3<f64>,
}

/// Complete output of an analysis run.
#[derive(Debug, Clone)]
pub struct EnsembleResult {
    pub grid: Grid,
    pub references: ReferenceLocations,
    pub snapshot_count: usize,
    /// Tracked component names in snapshot order.
    pub component_names: Vec<String>,
    pub components: BTreeMap<String, ComponentField>,
    pub magnitude: ComponentField,
}

impl EnsembleResult {
    pub fn correlation(&self, name: &str) -> Option<&Array3<f64>> {
        self.components.get(name).map(|c| &c.correlation)
    }

    pub fn variance(&self, name: &str) -> Option<&Array2<f64>> {
        self.components.get(name).map(|c| &c.variance)
    }

    pub fn mean(&self, name: &str) -> Option<&Array2<f64>> {
        self.components.get(name).map(|c| &c.mean)
    }

    pub fn magnitude_correlation(&self) -> &Array3<f64> {
        &self.magnitude.correlation
    }

    /// Component name → correlation field.
    pub fn correlation_fields(&self) -> BTreeMap<&str, &Array3<f64>> {
        self.components
            .iter()
            .map(|(name, c)| (name.as_str(), &c.correlation))
            .collect()
    }

    /// Component name → variance field.
    pub fn variance_fields(&self) -> BTreeMap<&str, &Array2<f64>> {
        self.components
            .iter()
            .map(|(name, c)| (name.as_str(), &c.variance))
            .collect()
    }

    /// Tracked components followed by the magnitude, in report order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &ComponentField)> {
        self.component_names
            .iter()
            .filter_map(|name| self.components.get(name).map(|c| (name.as_str(), c)))
            .chain(std::iter::once((MAGNITUDE, &self.magnitude)))
    }
}

// ---------------------------------------------------------------------------
// Accumulation
// ---------------------------------------------------------------------------

/// Grid and component layout fixed by the first snapshot.
#[derive(Debug, Clone)]
struct Layout {
    grid: Grid,
    /// Every component name of the first snapshot, sorted.
    all_names: Vec<String>,
}

/// Streaming state of an analysis run.
///
/// Use [`run`] for the common case; this type is exposed for callers that
/// push snapshots themselves or reduce partial ensembles with
/// [`merge`](Self::merge).
#[derive(Debug, Clone)]
pub struct EnsembleAccumulator {
    references: ReferenceLocations,
    options: EnsembleOptions,
    layout: Option<Layout>,
    /// Tracked components in snapshot order.
    tracked: Vec<(String, MomentAccumulator)>,
    magnitude: MomentAccumulator,
    count: usize,
}

impl EnsembleAccumulator {
    pub fn new(references: ReferenceLocations, options: EnsembleOptions) -> Self {
        Self {
            references,
            options,
            layout: None,
            tracked: Vec::new(),
            magnitude: MomentAccumulator::new(),
            count: 0,
        }
    }

    /// Snapshots folded so far.
    pub fn snapshot_count(&self) -> usize {
        self.count
    }

    pub fn references(&self) -> &ReferenceLocations {
        &self.references
    }

    fn establish(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.references.validate(snapshot.shape())?;

        let names: Vec<String> = snapshot.component_names().map(str::to_string).collect();
        let tracked: Vec<String> = match &self.options.components {
            None => names.clone(),
            Some(wanted) => {
                if let Some(unknown) = wanted.iter().find(|w| !names.contains(*w)) {
                    return Err(Error::config(format!(
                        "component '{unknown}' not present in snapshots (available: {})",
                        names.join(", ")
                    )));
                }
                names.iter().filter(|n| wanted.contains(*n)).cloned().collect()
            }
        };

        let mut all_names = names;
        all_names.sort();
        self.layout = Some(Layout {
            grid: snapshot.grid().clone(),
            all_names,
        });
        self.tracked = tracked
            .into_iter()
            .map(|name| (name, MomentAccumulator::new()))
            .collect();
        log::info!(
            "ensemble grid {}x{}, tracking {} component(s) + {MAGNITUDE} at {} reference location(s)",
            snapshot.shape().0,
            snapshot.shape().1,
            self.tracked.len(),
            self.references.len()
        );
        Ok(())
    }

    fn check_layout(layout: &Layout, snapshot: &Snapshot) -> Result<()> {
        let (rows, cols) = layout.grid.shape();
        if snapshot.shape() != (rows, cols) {
            let (r, c) = snapshot.shape();
            return Err(Error::shape(&[rows, cols], &[r, c]));
        }
        let mut names: Vec<String> = snapshot.component_names().map(str::to_string).collect();
        names.sort();
        if names != layout.all_names {
            return Err(Error::ComponentMismatch {
                expected: layout.all_names.clone(),
                found: names,
            });
        }
        Ok(())
    }

    /// Fold one snapshot into every tracked accumulator.
    ///
    /// The snapshot is checked in full before any accumulator changes.
    pub fn push(&mut self, snapshot: &Snapshot) -> Result<()> {
        if self.layout.is_none() {
            self.establish(snapshot)?;
        }
        if let Some(layout) = &self.layout {
            Self::check_layout(layout, snapshot)?;
        }

        let mut jobs: Vec<(&mut MomentAccumulator, ArrayView2<'_, f64>)> =
            Vec::with_capacity(self.tracked.len() + 1);
        for (name, acc) in &mut self.tracked {
            let field = snapshot
                .component(name)
                .ok_or_else(|| Error::config(format!("snapshot lacks component '{name}'")))?;
            jobs.push((acc, field));
        }
        jobs.push((&mut self.magnitude, snapshot.magnitude()));

        let refs = &self.references;
        let (rows, cols) = snapshot.shape();
        if self.options.fans_out(rows * cols, jobs.len()) {
            std::thread::scope(|s| {
                let handles: Vec<_> = jobs
                    .into_iter()
                    .map(|(acc, field)| s.spawn(move || acc.update(field, refs)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                    .collect::<Result<Vec<()>>>()
            })?;
        } else {
            for (acc, field) in jobs {
                acc.update(field, refs)?;
            }
        }

        self.count += 1;
        log::debug!("folded snapshot #{}", self.count);
        Ok(())
    }

    /// Combine with an accumulator built over a disjoint set of snapshots.
    pub fn merge(self, other: Self) -> Result<Self> {
        if self.references != other.references {
            return Err(Error::config(
                "cannot merge ensembles with different reference locations",
            ));
        }
        if other.layout.is_none() {
            return Ok(self);
        }
        if self.layout.is_none() {
            return Ok(other);
        }
        if let (Some(layout), Some(other_layout)) = (&self.layout, &other.layout) {
            if layout.grid.shape() != other_layout.grid.shape() {
                let (a, b) = (layout.grid.shape(), other_layout.grid.shape());
                return Err(Error::shape(&[a.0, a.1], &[b.0, b.1]));
            }
            if layout.all_names != other_layout.all_names {
                return Err(Error::ComponentMismatch {
                    expected: layout.all_names.clone(),
                    found: other_layout.all_names.clone(),
                });
            }
        }
        let tracked_names =
            |acc: &Self| acc.tracked.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>();
        if tracked_names(&self) != tracked_names(&other) {
            return Err(Error::ComponentMismatch {
                expected: tracked_names(&self),
                found: tracked_names(&other),
            });
        }

        let Self {
            references,
            options,
            layout,
            tracked,
            magnitude,
            count,
        } = self;
        let merged = tracked
            .into_iter()
            .zip(other.tracked)
            .map(|((name, a), (_, b))| Ok((name, a.merge(b)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            references,
            options,
            layout,
            tracked: merged,
            magnitude: magnitude.merge(other.magnitude)?,
            count: count + other.count,
        })
    }

    /// Finalize every accumulator and resolve correlation and variance fields.
    pub fn finish(self) -> Result<EnsembleResult> {
        let Some(layout) = self.layout else {
            return Err(Error::config(
                "ensemble is empty: no snapshots were produced by the source",
            ));
        };
        let n = self.count;
        let refs = &self.references;

        let resolve = |acc: &MomentAccumulator| -> Result<ComponentField> {
            let moments = acc.finalize(n)?;
            let result = correlation::compute(&moments, refs)?;
            Ok(ComponentField {
                mean: moments.mean,
                variance: result.variance,
                correlation: result.correlation,
            })
        };

        let mut components = BTreeMap::new();
        let mut component_names = Vec::with_capacity(self.tracked.len());
        for (name, acc) in &self.tracked {
            components.insert(name.clone(), resolve(acc)?);
            component_names.push(name.clone());
        }
        let magnitude = resolve(&self.magnitude)?;

        log::info!(
            "resolved {} component(s) + {MAGNITUDE} over {n} snapshot(s)",
            component_names.len()
        );
        Ok(EnsembleResult {
            grid: layout.grid,
            references: self.references,
            snapshot_count: n,
            component_names,
            components,
            magnitude,
        })
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Analyze an ensemble with default options.
pub fn run<I>(source: I, references: &ReferenceLocations) -> Result<EnsembleResult>
where
    I: IntoIterator<Item = Result<Snapshot>>,
{
    run_with(source, references, EnsembleOptions::default())
}

/// Analyze an ensemble: consume the source, fold every snapshot, resolve.
///
/// Fails with [`Error::Configuration`] on an empty source, and with the
/// first error the source yields or any shape/component disagreement.
pub fn run_with<I>(
    source: I,
    references: &ReferenceLocations,
    options: EnsembleOptions,
) -> Result<EnsembleResult>
where
    I: IntoIterator<Item = Result<Snapshot>>,
{
    let mut ensemble = EnsembleAccumulator::new(references.clone(), options);
    for snapshot in source {
        ensemble.push(&snapshot?)?;
    }
    ensemble.finish()
}
