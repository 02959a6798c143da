//! `influence inspect` — summarize a stored run.

use std::path::Path;

use influence_core::store::load_field3;
use influence_core::{CorrelationSummary, Error, Result, load_manifest, significance_threshold};
use ndarray::Axis;

pub fn run(run_dir: &str, alpha: f64, json: bool) -> Result<()> {
    let dir = Path::new(run_dir);
    let manifest = load_manifest(dir)?;

    if json {
        let text = serde_json::to_string_pretty(&manifest)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;
        println!("{text}");
        return Ok(());
    }

    println!("Run {}", manifest.id);
    println!("  created:    {}", manifest.created_at);
    println!("  snapshots:  {}", manifest.snapshot_count);
    println!("  grid:       {} x {}", manifest.shape[0], manifest.shape[1]);
    println!("  components: {}", manifest.components.join(", "));
    if let Some(source) = &manifest.source {
        println!("  source:     {source}");
    }
    if let Some(note) = &manifest.note {
        println!("  note:       {note}");
    }
    println!("  written by: influence {}", manifest.influence_version);
    for (k, r) in manifest.references.iter().enumerate() {
        match r.position {
            Some((x, z)) => println!("  ref {k}:      ({}, {}) @ x={x:.2}, z={z:.2}", r.row, r.col),
            None => println!("  ref {k}:      ({}, {})", r.row, r.col),
        }
    }
    println!();

    let threshold = significance_threshold(manifest.snapshot_count, alpha).unwrap_or_else(|e| {
        log::warn!("significance column disabled: {e}");
        f64::INFINITY
    });

    super::print_summary_header();
    for name in &manifest.components {
        let Some(files) = manifest.files.get(name) else {
            log::warn!("manifest lists '{name}' without field files");
            continue;
        };
        let correlation = load_field3(&dir.join(&files.correlation))?;
        for k in 0..correlation.len_of(Axis(2)) {
            let map = correlation.index_axis(Axis(2), k);
            super::print_summary_row(name, k, &CorrelationSummary::from_map(map, threshold));
        }
    }

    Ok(())
}
