//! CLI for influence — domain-of-influence maps from simulation ensembles.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "influence")]
#[command(about = "influence — which parts of the domain move together with this point?")]
#[command(version = influence_core::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Correlate every grid cell with one or more reference locations across an ensemble.
    Analyze {
        /// Directory holding the ensemble's snapshot files (searched recursively)
        dir: String,

        /// Reference location as X,Z. Fractions of the domain in [0, 1) unless --physical.
        /// Repeat for additional locations.
        #[arg(long = "ref", required = true, value_parser = commands::parse_pair)]
        refs: Vec<(f64, f64)>,

        /// Interpret --ref values as physical coordinates (nearest cell)
        #[arg(long)]
        physical: bool,

        /// Only files whose name contains this marker belong to the ensemble
        #[arg(long, default_value = influence_core::DEFAULT_MARKER)]
        marker: String,

        /// Track only these components (repeatable); magnitude is always tracked
        #[arg(long = "component")]
        components: Vec<String>,

        /// Update each component's accumulator on its own thread
        #[arg(long)]
        parallel: bool,

        /// Two-sided significance level used for the summary
        #[arg(long, default_value = "0.05")]
        alpha: f64,

        /// Write the run (manifest + fields) under this directory
        #[arg(long)]
        output: Option<String>,

        /// Free-form note stored in the run manifest
        #[arg(long)]
        note: Option<String>,
    },

    /// Print the grid cell nearest to a position in a snapshot file
    Locate {
        /// Any snapshot file of the ensemble
        file: String,

        /// X position (fraction of the domain unless --physical)
        x: f64,

        /// Z position (fraction of the domain unless --physical)
        z: f64,

        /// Interpret X and Z as physical coordinates
        #[arg(long)]
        physical: bool,
    },

    /// Summarize a stored run directory
    Inspect {
        /// Path to a run directory written by `analyze --output`
        run: String,

        /// Two-sided significance level used for the summary
        #[arg(long, default_value = "0.05")]
        alpha: f64,

        /// Print the manifest as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Analyze {
            dir,
            refs,
            physical,
            marker,
            components,
            parallel,
            alpha,
            output,
            note,
        } => commands::analyze::run(commands::analyze::AnalyzeCommandConfig {
            dir: &dir,
            refs: &refs,
            physical,
            marker: &marker,
            components,
            parallel,
            alpha,
            output_dir: output.as_deref(),
            note,
        }),
        Commands::Locate {
            file,
            x,
            z,
            physical,
        } => commands::locate::run(&file, x, z, physical),
        Commands::Inspect { run, alpha, json } => commands::inspect::run(&run, alpha, json),
    };

    if let Err(e) = outcome {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
