//! Command-line interface for the batch reconstruction driver.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};

use crate::batch::{self, BatchResult};
use crate::config::{BoundaryCondition, NormalModel, PipelineConfig, RadiusMode};
use crate::tools;

#[derive(Parser)]
#[command(name = "lasrecon")]
#[command(about = "Batch LAS-to-mesh reconstruction with CloudCompare and PoissonRecon", version)]
#[command(after_help = "\
Examples:
  lasrecon /path/to/las/files
  lasrecon . --output-dir Processed
  lasrecon /data --octree-depth 12 --boundary dirichlet

Output:
  Creates CloudCompare project files (.bin) containing the point cloud
  with normals and dip / dip-direction scalar fields, plus the
  reconstructed mesh with a density scalar field.")]
pub struct Cli {
    /// Directory containing LAS files
    #[arg(default_value = ".")]
    input_dir: PathBuf,

    /// Subdirectory name for output files
    #[arg(long, value_name = "NAME")]
    output_dir: Option<String>,

    /// Path to YAML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to the CloudCompare executable
    #[arg(long, value_name = "PATH", help_heading = "Tools")]
    cloudcompare: Option<PathBuf>,

    /// Path to the PoissonRecon executable
    #[arg(long, value_name = "PATH", help_heading = "Tools")]
    poisson_recon: Option<PathBuf>,

    /// K-nearest neighbors for MST normal orientation
    #[arg(long, value_name = "N", help_heading = "Normal estimation")]
    knn: Option<u32>,

    /// Neighborhood radius in cloud units, or 'auto'
    #[arg(long, value_name = "auto|METERS", help_heading = "Normal estimation")]
    radius: Option<RadiusMode>,

    /// Local surface model: triangulation, quadric or plane
    #[arg(long, value_name = "MODEL", help_heading = "Normal estimation")]
    model: Option<NormalModel>,

    /// Octree depth for Poisson reconstruction
    #[arg(long, value_name = "N", help_heading = "Reconstruction")]
    octree_depth: Option<u32>,

    /// Samples per node for Poisson reconstruction
    #[arg(long, value_name = "F", help_heading = "Reconstruction")]
    samples_per_node: Option<f64>,

    /// Point weight for Poisson reconstruction
    #[arg(long, value_name = "F", help_heading = "Reconstruction")]
    point_weight: Option<f64>,

    /// Boundary condition: free, dirichlet or neumann
    #[arg(long, value_name = "TYPE", help_heading = "Reconstruction")]
    boundary: Option<BoundaryCondition>,

    /// Solver thread count (default: tool decides)
    #[arg(long, value_name = "N", help_heading = "Reconstruction")]
    threads: Option<u32>,

    /// Interpolate source colors onto the mesh
    #[arg(long, value_name = "BOOL", help_heading = "Reconstruction")]
    interpolate_colors: Option<bool>,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Shorten a summary value to fit its column, respecting char boundaries
/// so multi-byte paths cannot split mid-character.
fn fit_summary_value(value: &str) -> String {
    if value.chars().count() > 39 {
        let head: String = value.chars().take(36).collect();
        format!("{}...", head)
    } else {
        value.to_string()
    }
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        println!("║ {:<20}: {:<39} ║", key, fit_summary_value(value));
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

/// Fold CLI flags over the loaded config; flags win where given.
fn merge_cli_overrides(config: &mut PipelineConfig, cli: &Cli) {
    if let Some(name) = &cli.output_dir {
        config.output_subdir = name.clone();
    }
    if let Some(path) = &cli.cloudcompare {
        config.tools.cloudcompare = Some(path.clone());
    }
    if let Some(path) = &cli.poisson_recon {
        config.tools.poisson_recon = Some(path.clone());
    }
    if let Some(knn) = cli.knn {
        config.normals.knn = knn;
    }
    if let Some(radius) = cli.radius {
        config.normals.radius = radius;
    }
    if let Some(model) = cli.model {
        config.normals.model = model;
    }
    if let Some(depth) = cli.octree_depth {
        config.reconstruction.octree_depth = depth;
    }
    if let Some(samples) = cli.samples_per_node {
        config.reconstruction.samples_per_node = samples;
    }
    if let Some(weight) = cli.point_weight {
        config.reconstruction.point_weight = weight;
    }
    if let Some(boundary) = cli.boundary {
        config.reconstruction.boundary = boundary;
    }
    if let Some(threads) = cli.threads {
        config.reconstruction.threads = Some(threads);
    }
    if let Some(colors) = cli.interpolate_colors {
        config.reconstruction.interpolate_colors = colors;
    }
}

/// Resolve tools, run the batch, hand back the aggregate result.
fn run_batch(
    config: &PipelineConfig,
    input_dir: &std::path::Path,
    interrupt: &AtomicBool,
    quiet: bool,
) -> anyhow::Result<BatchResult> {
    config.validate().context("invalid configuration")?;

    let tools = tools::resolve_tools(&config.tools).context("external tool discovery failed")?;
    info!(
        "CloudCompare: {} (via {})",
        tools.cloudcompare.path.display(),
        tools.cloudcompare.source
    );
    info!(
        "PoissonRecon: {} (via {})",
        tools.poisson_recon.path.display(),
        tools.poisson_recon.source
    );

    batch::run(&tools, config, input_dir, interrupt, quiet).context("batch processing failed")
}

/// Parse arguments, run the batch, and return the process exit code.
///
/// Returning the code instead of exiting here lets every destructor run,
/// which is what removes the intermediate exchange directory.
pub fn run() -> i32 {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            match cli.verbose {
                0 => log::LevelFilter::Info,
                _ => log::LevelFilter::Debug,
            }
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let mut config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };
    merge_cli_overrides(&mut config, &cli);

    // Stop before the next file on Ctrl-C; the current invocation is
    // allowed to finish
    let interrupt = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&interrupt);
    if let Err(e) = ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    }) {
        warn!("Could not install interrupt handler: {}", e);
    }

    let start = Instant::now();
    let result = match run_batch(&config, &cli.input_dir, &interrupt, cli.quiet) {
        Ok(result) => result,
        Err(e) => {
            error!("{:#}", e);
            return 1;
        }
    };

    if !cli.quiet {
        print_summary(
            "Batch Processing Complete",
            &[
                ("Input directory", cli.input_dir.display().to_string()),
                (
                    "Output directory",
                    cli.input_dir
                        .join(&config.output_subdir)
                        .display()
                        .to_string(),
                ),
                ("Total files", result.total.to_string()),
                ("Successful", result.succeeded.to_string()),
                ("Failed", result.failed.to_string()),
                ("Interrupted", result.interrupted.to_string()),
                ("Duration", format!("{:.2?}", start.elapsed())),
            ],
        );
    }

    result.exit_code()
}
