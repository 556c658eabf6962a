//! Storm track analysis.
//!
//! Reads track records and two boundary levels, overlays tracks on both
//! levels and writes per-region aggregate tables and a run summary.

mod boundaries;
mod report;
mod tracks;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use twister::{run_analysis, AnalysisConfig, RegionLevel};

use crate::boundaries::load_boundaries;
use crate::report::write_outputs;
use crate::tracks::load_tracks;

#[derive(Parser, Debug)]
#[command(name = "analyze")]
#[command(about = "Overlay storm tracks on administrative regions and aggregate")]
struct Args {
    /// Track records CSV (may be gzipped)
    #[arg(short, long)]
    tracks: PathBuf,

    /// Fine-level boundaries (GeoJSON)
    #[arg(long)]
    fine: PathBuf,

    /// Coarse-level boundaries (GeoJSON)
    #[arg(long)]
    coarse: PathBuf,

    /// TOML configuration (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for output tables
    #[arg(short, long, default_value = "out")]
    out_dir: PathBuf,

    /// Override the earliest year kept
    #[arg(long)]
    min_year: Option<i32>,

    /// Override the number of class bins
    #[arg(long)]
    bins: Option<usize>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Twister Analysis");

    let mut config = match &args.config {
        Some(path) => {
            info!("Config: {}", path.display());
            AnalysisConfig::load_from_file(path)?
        }
        None => {
            info!("No config given, using defaults");
            AnalysisConfig::default()
        }
    };
    if let Some(min_year) = args.min_year {
        config.min_year = min_year;
    }
    if let Some(bins) = args.bins {
        config.classification.bins = bins;
    }

    let tracks = load_tracks(&args.tracks)?;
    let fine = load_boundaries(&args.fine, &config.boundaries.fine)?;
    let coarse = load_boundaries(&args.coarse, &config.boundaries.coarse)?;

    let report = run_analysis(&config, &tracks, fine, coarse, true)
        .context("Analysis failed")?;

    for level in RegionLevel::all() {
        if let Some(s) = report.summary.regions.get(level) {
            info!(
                "{}: {} regions, {} excluded or flagged, {} segments outside all regions",
                level.field_name(),
                s.regions_loaded,
                s.exclusions.total(),
                s.untouched_segments
            );
        }
    }
    if !report.summary.tracks.is_empty() {
        warn!(
            "{} track records excluded; see summary.json",
            report.summary.tracks.total()
        );
    }

    let projection = format!(
        "{} -> {}",
        config.projection.source, config.projection.target
    );
    write_outputs(&args.out_dir, &report, config.min_year, projection)?;

    info!("Done");
    Ok(())
}
