//! End-to-end run: records in, classified per-region aggregates out.
//!
//! Every stage receives the same explicit configuration and returns a new
//! value; nothing is shared between runs.

use std::collections::BTreeMap;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::aggregate;
use crate::builder::build_segments;
use crate::catalog::RegionCatalog;
use crate::classify::{apply_classifications, classify, normalize, Classification};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, ExclusionKind, ExclusionSummary};
use crate::models::{RawRegionRecord, RawTrackRecord, RegionAggregate, RegionLevel, TrackSegment};
use crate::overlay::OverlayEngine;
use crate::projection::Projector;

/// Results for one administrative level
#[derive(Debug, Clone)]
pub struct LevelReport {
    pub level: RegionLevel,
    pub aggregates: Vec<RegionAggregate>,
    pub classifications: Vec<Classification>,

    /// Total length outside every region (when diagnostics are enabled)
    pub uncovered_length: Option<f64>,
    pub untouched_segments: usize,
}

impl LevelReport {
    pub fn get(&self, region_id: &str) -> Option<&RegionAggregate> {
        self.aggregates
            .binary_search_by(|a| a.region_id.as_str().cmp(region_id))
            .ok()
            .map(|i| &self.aggregates[i])
    }
}

/// What the run kept, dropped and flagged
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub records_read: usize,
    pub segments_built: usize,
    pub tracks: ExclusionSummary,
    pub regions: BTreeMap<RegionLevel, LevelSummary>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LevelSummary {
    pub regions_loaded: usize,
    pub exclusions: ExclusionSummary,
    pub untouched_segments: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncovered_length: Option<f64>,

    /// Fine regions whose parent is missing from the coarse catalog
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub orphaned: Vec<String>,
}

impl RunSummary {
    /// Per-item problems across all stages (zero-area flags included)
    pub fn total_excluded(&self) -> usize {
        self.tracks.total()
            + self
                .regions
                .values()
                .map(|l| l.exclusions.total())
                .sum::<usize>()
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub fine: LevelReport,
    pub coarse: LevelReport,
    pub summary: RunSummary,
}

/// Overlay, aggregate, normalize and classify one level
pub fn analyze_level(
    config: &AnalysisConfig,
    segments: &[TrackSegment],
    catalog: &RegionCatalog,
    progress: Option<ProgressBar>,
) -> LevelReport {
    let mut engine = OverlayEngine::new(catalog).parallel(config.parallel);
    if let Some(pb) = progress {
        engine = engine.with_progress(pb);
    }
    let overlay = engine.run(segments);

    let aggregates = normalize(&aggregate(&overlay, catalog));

    let classifications: Vec<Classification> = config
        .classification
        .metrics
        .iter()
        .map(|&metric| classify(&aggregates, metric, config.classification.bins))
        .collect();
    let aggregates = apply_classifications(&aggregates, &classifications);

    let uncovered_length = config
        .diagnostics
        .report_uncovered_length
        .then(|| overlay.uncovered_length());
    if let Some(len) = uncovered_length {
        info!(
            "{} level: {:.1} units of track length outside all regions",
            catalog.level().field_name(),
            len
        );
    }

    LevelReport {
        level: catalog.level(),
        aggregates,
        classifications,
        uncovered_length,
        untouched_segments: overlay.untouched_segments(),
    }
}

/// Fine regions whose parent identifier is not in the coarse catalog
pub fn orphaned_regions(fine: &RegionCatalog, coarse: &RegionCatalog) -> Vec<String> {
    fine.parent_lookup()
        .into_iter()
        .filter(|(_, parent)| coarse.get(parent).is_none())
        .map(|(id, _)| id.to_string())
        .collect()
}

fn overlay_progress(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Run the whole analysis on materialized inputs.
///
/// Only schema and configuration problems abort; bad records and regions are
/// excluded and reported in the summary.
pub fn run_analysis(
    config: &AnalysisConfig,
    tracks: &[RawTrackRecord],
    fine: Vec<RawRegionRecord>,
    coarse: Vec<RawRegionRecord>,
    show_progress: bool,
) -> Result<AnalysisReport, AnalysisError> {
    config.validate()?;
    let projector = Projector::new(&config.projection)?;

    let build = build_segments(tracks, config, &projector)?;

    let fine_load = RegionCatalog::load(RegionLevel::Fine, fine, &projector);
    let coarse_load = RegionCatalog::load(RegionLevel::Coarse, coarse, &projector);

    let orphaned = orphaned_regions(&fine_load.catalog, &coarse_load.catalog);
    if !orphaned.is_empty() {
        warn!(
            "{} fine regions reference a parent missing from the coarse catalog",
            orphaned.len()
        );
    }

    let progress = || show_progress.then(|| overlay_progress(build.segments.len()));
    let fine_report = analyze_level(config, &build.segments, &fine_load.catalog, progress());
    let coarse_report = analyze_level(config, &build.segments, &coarse_load.catalog, progress());

    let mut summary = RunSummary {
        records_read: build.records_read,
        segments_built: build.segments.len(),
        tracks: build.exclusions,
        regions: BTreeMap::new(),
    };
    summary.regions.insert(
        RegionLevel::Fine,
        LevelSummary {
            regions_loaded: fine_load.catalog.len(),
            exclusions: fine_load.exclusions,
            untouched_segments: fine_report.untouched_segments,
            uncovered_length: fine_report.uncovered_length,
            orphaned,
        },
    );
    summary.regions.insert(
        RegionLevel::Coarse,
        LevelSummary {
            regions_loaded: coarse_load.catalog.len(),
            exclusions: coarse_load.exclusions,
            untouched_segments: coarse_report.untouched_segments,
            uncovered_length: coarse_report.uncovered_length,
            orphaned: Vec::new(),
        },
    );

    info!(
        "Run complete: {} segments from {} records; {} records and regions excluded or flagged ({} unprojectable tracks)",
        summary.segments_built,
        summary.records_read,
        summary.total_excluded(),
        summary.tracks.count(ExclusionKind::ProjectionFailure),
    );

    Ok(AnalysisReport {
        fine: fine_report,
        coarse: coarse_report,
        summary,
    })
}
