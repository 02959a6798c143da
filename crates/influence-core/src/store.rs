//! Persisting analysis runs for later inspection and plotting.
//!
//! # Storage Format
//!
//! Each run is a directory `<timestamp>-<id8>/` containing:
//! - `run.json`: manifest (ensemble size, components, references, file map)
//! - `grid.json`: the shared grid
//! - `<component>.mean.json`, `<component>.variance.json`,
//!   `<component>.correlation.json`: ndarray fields, one set per component
//!   plus `magnitude`

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ndarray::{Array2, Array3};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ensemble::EnsembleResult;
use crate::error::{Error, Result};
use crate::grid::Grid;

pub const MANIFEST_FILE: &str = "run.json";
pub const GRID_FILE: &str = "grid.json";
pub const MANIFEST_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// One reference location as recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub row: usize,
    pub col: usize,
    /// Physical `(x, z)` of the cell, two decimals.
    pub position: Option<(f64, f64)>,
}

/// Relative file names of one component's fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldFiles {
    pub mean: String,
    pub variance: String,
    pub correlation: String,
}

/// Contents of `run.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub version: u32,
    pub id: String,
    pub created_at: String,
    pub snapshot_count: usize,
    /// `[rows, cols]`.
    pub shape: [usize; 2],
    /// Tracked components followed by `magnitude`.
    pub components: Vec<String>,
    pub references: Vec<ReferenceRecord>,
    pub files: BTreeMap<String, FieldFiles>,
    pub source: Option<String>,
    pub note: Option<String>,
    pub influence_version: String,
}

/// Where and how to write a run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub output_dir: PathBuf,
    /// Ensemble location, recorded verbatim.
    pub source: Option<String>,
    pub note: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("runs"),
            source: None,
            note: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write a run directory and return its path.
pub fn write_run(result: &EnsembleResult, config: &RunConfig) -> Result<PathBuf> {
    let id = Uuid::new_v4().to_string();
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let dir_name = format!("{}-{}", format_compact(since_epoch), &id[..8]);
    let run_dir = config.output_dir.join(dir_name);
    fs::create_dir_all(&run_dir)?;

    write_json(&run_dir.join(GRID_FILE), &result.grid)?;

    let mut files = BTreeMap::new();
    let mut components = Vec::new();
    let mut stems = HashSet::new();
    for (name, field) in result.fields() {
        let stem = unique_stem(name, &mut stems);
        let entry = FieldFiles {
            mean: format!("{stem}.mean.json"),
            variance: format!("{stem}.variance.json"),
            correlation: format!("{stem}.correlation.json"),
        };
        write_json(&run_dir.join(&entry.mean), &field.mean)?;
        write_json(&run_dir.join(&entry.variance), &field.variance)?;
        write_json(&run_dir.join(&entry.correlation), &field.correlation)?;
        files.insert(name.to_string(), entry);
        components.push(name.to_string());
    }

    let references = result
        .references
        .iter()
        .map(|cell| ReferenceRecord {
            row: cell.row,
            col: cell.col,
            position: result.grid.position(cell),
        })
        .collect();

    let (rows, cols) = result.grid.shape();
    let manifest = RunManifest {
        version: MANIFEST_VERSION,
        id,
        created_at: format_iso8601(since_epoch),
        snapshot_count: result.snapshot_count,
        shape: [rows, cols],
        components,
        references,
        files,
        source: config.source.clone(),
        note: config.note.clone(),
        influence_version: crate::VERSION.to_string(),
    };
    write_json(&run_dir.join(MANIFEST_FILE), &manifest)?;
    log::info!("wrote run {} to {}", manifest.id, run_dir.display());

    Ok(run_dir)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    writer.flush()?;
    Ok(())
}

/// Component names may contain characters unsuitable for file names (`|B|`).
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// [`file_stem`], suffixed `-2`, `-3`, ... when another component of the run
/// already sanitizes to the same stem (`B x` and `B_x`).
fn unique_stem(name: &str, taken: &mut HashSet<String>) -> String {
    let base = file_stem(name);
    if taken.insert(base.clone()) {
        return base;
    }
    let mut suffix = 2;
    loop {
        let candidate = format!("{base}-{suffix}");
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        suffix += 1;
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(File::open(path)?);
    serde_json::from_reader(reader).map_err(|e| Error::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

pub fn load_manifest(run_dir: &Path) -> Result<RunManifest> {
    let manifest: RunManifest = read_json(&run_dir.join(MANIFEST_FILE))?;
    if manifest.version != MANIFEST_VERSION {
        return Err(Error::Parse {
            path: run_dir.join(MANIFEST_FILE).display().to_string(),
            message: format!("unsupported manifest version {}", manifest.version),
        });
    }
    Ok(manifest)
}

pub fn load_grid(run_dir: &Path) -> Result<Grid> {
    read_json(&run_dir.join(GRID_FILE))
}

/// Load a `(R, C)` field such as a mean or variance.
pub fn load_field2(path: &Path) -> Result<Array2<f64>> {
    read_json(path)
}

/// Load a `(R, C, L)` correlation field.
pub fn load_field3(path: &Path) -> Result<Array3<f64>> {
    read_json(path)
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// `2026-02-15T01:30:00Z`
fn format_iso8601(since_epoch: Duration) -> String {
    let (y, mo, d, h, mi, s) = utc_parts(since_epoch.as_secs());
    format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:{s:02}Z")
}

/// `20260215T013000Z`, used in directory names.
fn format_compact(since_epoch: Duration) -> String {
    let (y, mo, d, h, mi, s) = utc_parts(since_epoch.as_secs());
    format!("{y:04}{mo:02}{d:02}T{h:02}{mi:02}{s:02}Z")
}

/// Seconds since the Unix epoch → UTC calendar fields (proleptic Gregorian).
fn utc_parts(secs: u64) -> (i64, u32, u32, u32, u32, u32) {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (h, mi, s) = ((rem / 3600) as u32, ((rem / 60) % 60) as u32, (rem % 60) as u32);

    // Civil-from-days over 400-year eras.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let mo = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let y = yoe + era * 400 + i64::from(mo <= 2);
    (y, mo, d, h, mi, s)
}
