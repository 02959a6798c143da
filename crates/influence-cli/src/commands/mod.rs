pub mod analyze;
pub mod inspect;
pub mod locate;

use influence_core::{CellIndex, CorrelationSummary, Grid, ReferenceLocations, Result};

/// Parse an `X,Z` pair as given to `--ref`.
pub fn parse_pair(s: &str) -> std::result::Result<(f64, f64), String> {
    let (x, z) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Z but got '{s}'"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<f64>()
            .map_err(|e| format!("invalid number '{}': {e}", v.trim()))
    };
    Ok((parse(x)?, parse(z)?))
}

/// Map one position to a cell: fractions of the domain by default,
/// nearest cell when `physical` is set.
pub fn resolve_cell(grid: &Grid, x: f64, z: f64, physical: bool) -> Result<CellIndex> {
    if physical {
        grid.nearest_cell(x, z)
    } else {
        grid.cell_at_fraction(x, z)
    }
}

pub fn resolve_references(
    grid: &Grid,
    positions: &[(f64, f64)],
    physical: bool,
) -> Result<ReferenceLocations> {
    let cells = positions
        .iter()
        .map(|&(x, z)| resolve_cell(grid, x, z, physical))
        .collect::<Result<Vec<_>>>()?;
    ReferenceLocations::new(cells)
}

/// Label for a reference cell: `(row, col) @ x=…, z=…`.
pub fn describe_cell(grid: &Grid, cell: CellIndex) -> String {
    match grid.position(cell) {
        Some((x, z)) => format!("{cell} @ x={x:.2}, z={z:.2}"),
        None => format!("{cell}"),
    }
}

pub fn print_summary_header() {
    println!(
        "  {:<12} {:>4} {:>8} {:>8} {:>8} {:>9}",
        "Component", "Ref", "min r", "max r", "mean|r|", "|r|>crit"
    );
    println!("  {}", "-".repeat(54));
}

pub fn print_summary_row(name: &str, k: usize, summary: &CorrelationSummary) {
    println!(
        "  {:<12} {:>4} {:>8.3} {:>8.3} {:>8.3} {:>8.1}%",
        name,
        k,
        summary.min,
        summary.max,
        summary.mean_abs,
        summary.fraction_above * 100.0
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use influence_core::{Error, NamedField, Snapshot, load_manifest, write_snapshot};
    use ndarray::Array2;
    use std::path::{Path, PathBuf};

    /// 4 rows x 5 cols, x = 2*col, z = -row.
    fn sample_grid() -> Grid {
        Grid::new(
            Array2::from_shape_fn((4, 5), |(_, c)| 2.0 * c as f64),
            Array2::zeros((4, 5)),
            Array2::from_shape_fn((4, 5), |(r, _)| -(r as f64)),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("0.25,0.5").unwrap(), (0.25, 0.5));
        assert_eq!(parse_pair(" -35.0 , 12 ").unwrap(), (-35.0, 12.0));
        assert!(parse_pair("0.25").is_err());
        assert!(parse_pair("a,1").is_err());
    }

    #[test]
    fn test_resolve_fractional() {
        let grid = sample_grid();
        let cell = resolve_cell(&grid, 0.5, 0.25, false).unwrap();
        assert_eq!(cell, CellIndex::new(1, 2));
        assert!(resolve_cell(&grid, 1.0, 0.0, false).is_err());
    }

    #[test]
    fn test_resolve_physical() {
        let grid = sample_grid();
        let cell = resolve_cell(&grid, 5.9, -2.2, true).unwrap();
        assert_eq!(cell, CellIndex::new(2, 3));
    }

    #[test]
    fn test_resolve_references_keeps_order() {
        let grid = sample_grid();
        let refs = resolve_references(&grid, &[(0.9, 0.9), (0.0, 0.0)], false).unwrap();
        assert_eq!(refs.as_slice(), &[CellIndex::new(3, 4), CellIndex::new(0, 0)]);
        assert!(resolve_references(&grid, &[], false).is_err());
    }

    /// Writes `n` members `OUT0<i>.json` whose Bx follows one parameter.
    fn write_ensemble(dir: &Path, n: usize) {
        for i in 0..n {
            let p = (i as f64 * 0.9).sin();
            let bx = Array2::from_shape_fn((4, 5), |(r, c)| p * (r + c + 1) as f64);
            let bz = Array2::from_shape_fn((4, 5), |(r, c)| ((i * 7 + r * 3 + c) % 5) as f64);
            let snapshot = Snapshot::with_norm_magnitude(
                sample_grid(),
                vec![NamedField::new("Bx", bx), NamedField::new("Bz", bz)],
            )
            .unwrap();
            write_snapshot(&dir.join(format!("OUT0{i}.json")), &snapshot).unwrap();
        }
    }

    fn only_run_dir(output: &Path) -> PathBuf {
        let mut dirs: Vec<PathBuf> = std::fs::read_dir(output)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(dirs.len(), 1, "expected one run directory, got {dirs:?}");
        dirs.remove(0)
    }

    fn analyze_config<'a>(
        dir: &'a str,
        refs: &'a [(f64, f64)],
        output_dir: Option<&'a str>,
    ) -> analyze::AnalyzeCommandConfig<'a> {
        analyze::AnalyzeCommandConfig {
            dir,
            refs,
            physical: false,
            marker: influence_core::DEFAULT_MARKER,
            components: Vec::new(),
            parallel: false,
            alpha: 0.05,
            output_dir,
            note: Some("cli test".to_string()),
        }
    }

    #[test]
    fn test_analyze_then_inspect_run() {
        let ensemble = tempfile::tempdir().unwrap();
        write_ensemble(ensemble.path(), 6);
        let output = tempfile::tempdir().unwrap();

        let dir = ensemble.path().display().to_string();
        let out = output.path().display().to_string();
        let refs = [(0.5, 0.25), (0.0, 0.0)];
        analyze::run(analyze_config(&dir, &refs, Some(&out))).unwrap();

        let run_dir = only_run_dir(output.path());
        let manifest = load_manifest(&run_dir).unwrap();
        assert_eq!(manifest.snapshot_count, 6);
        assert_eq!(manifest.components, ["Bx", "Bz", "magnitude"]);
        assert_eq!(manifest.references.len(), 2);
        assert_eq!((manifest.references[0].row, manifest.references[0].col), (1, 2));
        assert_eq!(manifest.note.as_deref(), Some("cli test"));
        assert_eq!(manifest.source.as_deref(), Some(dir.as_str()));

        let run_path = run_dir.display().to_string();
        inspect::run(&run_path, 0.05, false).unwrap();
        inspect::run(&run_path, 0.05, true).unwrap();
    }

    #[test]
    fn test_analyze_physical_refs_and_component_filter() {
        let ensemble = tempfile::tempdir().unwrap();
        write_ensemble(ensemble.path(), 4);
        let output = tempfile::tempdir().unwrap();

        let dir = ensemble.path().display().to_string();
        let out = output.path().display().to_string();
        let refs = [(5.9, -2.2)];
        let mut cfg = analyze_config(&dir, &refs, Some(&out));
        cfg.physical = true;
        cfg.components = vec!["Bz".to_string()];
        cfg.parallel = true;
        analyze::run(cfg).unwrap();

        let manifest = load_manifest(&only_run_dir(output.path())).unwrap();
        assert_eq!(manifest.components, ["Bz", "magnitude"]);
        assert_eq!((manifest.references[0].row, manifest.references[0].col), (2, 3));
    }

    #[test]
    fn test_analyze_without_output_writes_nothing() {
        let ensemble = tempfile::tempdir().unwrap();
        write_ensemble(ensemble.path(), 3);
        let dir = ensemble.path().display().to_string();
        analyze::run(analyze_config(&dir, &[(0.1, 0.1)], None)).unwrap();
        assert_eq!(std::fs::read_dir(ensemble.path()).unwrap().count(), 3);
    }

    #[test]
    fn test_analyze_rejects_bad_input() {
        let empty = tempfile::tempdir().unwrap();
        let dir = empty.path().display().to_string();
        let err = analyze::run(analyze_config(&dir, &[(0.1, 0.1)], None)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let ensemble = tempfile::tempdir().unwrap();
        write_ensemble(ensemble.path(), 3);
        let dir = ensemble.path().display().to_string();
        let err = analyze::run(analyze_config(&dir, &[(1.5, 0.1)], None)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));

        let mut cfg = analyze_config(&dir, &[(0.1, 0.1)], None);
        cfg.alpha = 1.5;
        assert!(matches!(analyze::run(cfg), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_locate_and_inspect_errors() {
        let ensemble = tempfile::tempdir().unwrap();
        write_ensemble(ensemble.path(), 1);
        let file = ensemble.path().join("OUT00.json").display().to_string();
        locate::run(&file, 0.5, 0.5, false).unwrap();
        locate::run(&file, 3.0, -1.0, true).unwrap();
        assert!(locate::run(&file, 1.0, 0.5, false).is_err());

        let not_a_run = ensemble.path().display().to_string();
        assert!(matches!(
            inspect::run(&not_a_run, 0.05, false),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_describe_cell() {
        let grid = sample_grid();
        let label = describe_cell(&grid, CellIndex::new(1, 2));
        assert!(label.contains("x=4.00"));
        assert!(label.contains("z=-1.00"));
    }
}
