//! `influence locate` — find the grid cell for a position.

use std::path::Path;

use influence_core::{Result, read_snapshot};

pub fn run(file: &str, x: f64, z: f64, physical: bool) -> Result<()> {
    let snapshot = read_snapshot(Path::new(file))?;
    let grid = snapshot.grid();
    let cell = super::resolve_cell(grid, x, z, physical)?;
    let (rows, cols) = grid.shape();

    println!("Grid: {rows} x {cols}");
    println!("Cell: {}", super::describe_cell(grid, cell));
    Ok(())
}
