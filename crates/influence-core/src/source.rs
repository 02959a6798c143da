//! On-disk snapshots and the directory-backed snapshot source.
//!
//! A snapshot file is a JSON document with row-major nested arrays:
//!
//! ```json
//! {
//!   "grid": { "x": [[...]], "y": [[...]], "z": [[...]] },
//!   "components": [ { "name": "Bx", "values": [[...]] }, ... ],
//!   "magnitude": [[...]]
//! }
//! ```
//!
//! `magnitude` is optional; when absent it is the Euclidean norm of the
//! components. Files ending in `.gz` are gzip-compressed.
//!
//! [`SnapshotDirectory`] lists matching files up front and parses them one
//! at a time as it is iterated, so at most one snapshot is in memory.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::snapshot::{NamedField, Snapshot};

/// Default file-name marker for ensemble members (`OUT00.json`, `OUT01.json.gz`, ...).
pub const DEFAULT_MARKER: &str = "OUT0";

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridRecord {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<Vec<f64>>,
    pub z: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRecord {
    pub name: String,
    pub values: Vec<Vec<f64>>,
}

/// Serialized form of a [`Snapshot`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub grid: GridRecord,
    pub components: Vec<ComponentRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<Vec<Vec<f64>>>,
}

impl SnapshotRecord {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let grid = snapshot.grid();
        Self {
            grid: GridRecord {
                x: to_rows(grid.x()),
                y: to_rows(grid.y()),
                z: to_rows(grid.z()),
            },
            components: snapshot
                .components()
                .iter()
                .map(|f| ComponentRecord {
                    name: f.name.clone(),
                    values: to_rows(&f.values),
                })
                .collect(),
            magnitude: Some(to_rows(&snapshot.magnitude().to_owned())),
        }
    }

    /// Validate shapes and build the in-memory snapshot.
    ///
    /// `origin` only labels parse errors.
    pub fn into_snapshot(self, origin: &str) -> Result<Snapshot> {
        let grid = Grid::new(
            from_rows(self.grid.x, origin, "grid.x")?,
            from_rows(self.grid.y, origin, "grid.y")?,
            from_rows(self.grid.z, origin, "grid.z")?,
        )?;
        let components = self
            .components
            .into_iter()
            .map(|c| {
                let what = format!("component {}", c.name);
                Ok(NamedField::new(c.name, from_rows(c.values, origin, &what)?))
            })
            .collect::<Result<Vec<_>>>()?;
        match self.magnitude {
            Some(rows) => Snapshot::new(grid, components, from_rows(rows, origin, "magnitude")?),
            None => Snapshot::with_norm_magnitude(grid, components),
        }
    }
}

/// Nested rows → `(R, C)` array; ragged input is a parse error.
pub fn from_rows(rows: Vec<Vec<f64>>, origin: &str, what: &str) -> Result<Array2<f64>> {
    let n_rows = rows.len();
    let n_cols = rows.first().map_or(0, Vec::len);
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_cols) {
        return Err(Error::Parse {
            path: origin.to_string(),
            message: format!(
                "{what}: row {i} has {} values, expected {n_cols}",
                row.len()
            ),
        });
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n_rows, n_cols), flat).map_err(|e| Error::Parse {
        path: origin.to_string(),
        message: format!("{what}: {e}"),
    })
}

/// `(R, C)` array → nested rows.
pub fn to_rows(array: &Array2<f64>) -> Vec<Vec<f64>> {
    array.rows().into_iter().map(|r| r.to_vec()).collect()
}

fn is_gzip(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

/// Read and parse one snapshot file (plain or `.gz`).
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let origin = path.display().to_string();
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if is_gzip(path) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let record: SnapshotRecord =
        serde_json::from_reader(BufReader::new(reader)).map_err(|e| Error::Parse {
            path: origin.clone(),
            message: e.to_string(),
        })?;
    record.into_snapshot(&origin)
}

/// Write a snapshot file, gzip-compressed when the path ends in `.gz`.
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
    let record = SnapshotRecord::from_snapshot(snapshot);
    let file = File::create(path)?;
    let to_io = |e: serde_json::Error| Error::Io(std::io::Error::other(e));
    if is_gzip(path) {
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(&mut encoder, &record).map_err(to_io)?;
        encoder.finish()?.flush()?;
    } else {
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &record).map_err(to_io)?;
        writer.flush()?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Directory source
// ---------------------------------------------------------------------------

/// Lazily parsed ensemble members under a directory tree.
///
/// Files are visited in path order; a file belongs to the ensemble when its
/// name contains the marker.
#[derive(Debug)]
pub struct SnapshotDirectory {
    root: PathBuf,
    paths: std::vec::IntoIter<PathBuf>,
    total: usize,
}

impl SnapshotDirectory {
    pub fn open(root: impl AsRef<Path>, marker: &str) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("ensemble directory {} does not exist", root.display()),
            )));
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_dir() {
                log::info!("scanning {}", entry.path().display());
                continue;
            }
            if entry.file_name().to_string_lossy().contains(marker) {
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        log::info!(
            "found {} snapshot file(s) matching '{marker}' under {}",
            paths.len(),
            root.display()
        );

        let total = paths.len();
        Ok(Self {
            root,
            paths: paths.into_iter(),
            total,
        })
    }

    /// Open with the [`DEFAULT_MARKER`].
    pub fn open_default(root: impl AsRef<Path>) -> Result<Self> {
        Self::open(root, DEFAULT_MARKER)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of files discovered (including ones already read).
    pub fn total(&self) -> usize {
        self.total
    }

    /// Files not yet read.
    pub fn remaining(&self) -> &[PathBuf] {
        self.paths.as_slice()
    }
}

impl Iterator for SnapshotDirectory {
    type Item = Result<Snapshot>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        log::debug!("reading {}", path.display());
        Some(read_snapshot(&path))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.paths.size_hint()
    }
}
