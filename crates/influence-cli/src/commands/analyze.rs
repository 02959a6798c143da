//! `influence analyze` — run an ensemble and summarize its correlation maps.

use std::path::PathBuf;
use std::time::Instant;

use influence_core::{
    CorrelationSummary, EnsembleOptions, Error, Result, RunConfig, SnapshotDirectory,
    read_snapshot, run_with, significance_threshold, write_run,
};
use ndarray::Axis;

pub struct AnalyzeCommandConfig<'a> {
    pub dir: &'a str,
    pub refs: &'a [(f64, f64)],
    pub physical: bool,
    pub marker: &'a str,
    pub components: Vec<String>,
    pub parallel: bool,
    pub alpha: f64,
    pub output_dir: Option<&'a str>,
    pub note: Option<String>,
}

pub fn run(cfg: AnalyzeCommandConfig<'_>) -> Result<()> {
    if !(cfg.alpha > 0.0 && cfg.alpha < 1.0) {
        return Err(Error::Configuration(format!(
            "--alpha must lie in (0, 1), got {}",
            cfg.alpha
        )));
    }

    let source = SnapshotDirectory::open(cfg.dir, cfg.marker)?;
    let Some(first) = source.remaining().first() else {
        return Err(Error::Configuration(format!(
            "no files matching '{}' under {}",
            cfg.marker, cfg.dir
        )));
    };

    // Reference positions are resolved against the first member's grid; the
    // run itself rejects any member whose grid shape differs.
    let probe = read_snapshot(first)?;
    let refs = super::resolve_references(probe.grid(), cfg.refs, cfg.physical)?;

    println!(
        "Analyzing {} snapshot(s) under {} ({} reference location(s))",
        source.total(),
        cfg.dir,
        refs.len()
    );
    for (k, cell) in refs.iter().enumerate() {
        println!("  ref {k}: {}", super::describe_cell(probe.grid(), cell));
    }
    println!();

    let options = EnsembleOptions {
        components: (!cfg.components.is_empty()).then_some(cfg.components),
        parallel: cfg.parallel,
        ..Default::default()
    };
    let t0 = Instant::now();
    let result = run_with(source, &refs, options)?;
    println!(
        "Accumulated {} snapshot(s) in {:.2}s\n",
        result.snapshot_count,
        t0.elapsed().as_secs_f64()
    );

    let threshold = match significance_threshold(result.snapshot_count, cfg.alpha) {
        Ok(t) => {
            println!("Critical |r| at alpha = {}: {t:.3}\n", cfg.alpha);
            t
        }
        Err(e) => {
            log::warn!("significance column disabled: {e}");
            f64::INFINITY
        }
    };

    super::print_summary_header();
    for (name, field) in result.fields() {
        for k in 0..refs.len() {
            let map = field.correlation.index_axis(Axis(2), k);
            super::print_summary_row(name, k, &CorrelationSummary::from_map(map, threshold));
        }
    }

    if let Some(output_dir) = cfg.output_dir {
        let config = RunConfig {
            output_dir: PathBuf::from(output_dir),
            source: Some(cfg.dir.to_string()),
            note: cfg.note,
        };
        let run_dir = write_run(&result, &config)?;
        println!("\nRun written to {}", run_dir.display());
        println!("Inspect with: influence inspect {}", run_dir.display());
    }

    Ok(())
}
