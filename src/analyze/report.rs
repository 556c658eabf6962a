//! Output tables and run summary for the rendering collaborator.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use twister::classify::Classification;
use twister::models::{DensityMetric, RegionAggregate, RegionLevel};
use twister::{AnalysisReport, LevelReport, RunSummary};

/// One flat CSV row per region
#[derive(Debug, Serialize)]
pub struct AggregateRow<'a> {
    pub level: RegionLevel,
    pub region_id: &'a str,
    pub name: &'a str,
    pub parent_id: Option<&'a str>,
    pub parent_name: Option<&'a str>,
    pub event_count: u64,
    pub total_severity: u64,
    pub max_rating: Option<String>,
    pub ratings: String,
    pub total_length: f64,
    pub total_track_area: f64,
    pub area: f64,
    pub events_per_area: Option<f64>,
    pub severity_per_area: Option<f64>,
    pub length_per_area: Option<f64>,
    pub track_area_per_area: Option<f64>,
    pub events_class: Option<usize>,
    pub severity_class: Option<usize>,
    pub length_class: Option<usize>,
    pub track_area_class: Option<usize>,
}

impl<'a> AggregateRow<'a> {
    pub fn new(aggregate: &'a RegionAggregate, parent_name: Option<&'a str>) -> Self {
        let ratings = aggregate
            .rating_counts
            .iter()
            .map(|(rating, n)| format!("{}={}", rating, n))
            .collect::<Vec<_>>()
            .join(";");

        Self {
            level: aggregate.level,
            region_id: &aggregate.region_id,
            name: &aggregate.name,
            parent_id: aggregate.parent_id.as_deref(),
            parent_name,
            event_count: aggregate.event_count,
            total_severity: aggregate.total_severity,
            max_rating: aggregate.max_rating.map(|r| r.to_string()),
            ratings,
            total_length: aggregate.total_length,
            total_track_area: aggregate.total_track_area,
            area: aggregate.area,
            events_per_area: aggregate.density(DensityMetric::Events),
            severity_per_area: aggregate.density(DensityMetric::Severity),
            length_per_area: aggregate.density(DensityMetric::Length),
            track_area_per_area: aggregate.density(DensityMetric::TrackArea),
            events_class: aggregate.class(DensityMetric::Events),
            severity_class: aggregate.class(DensityMetric::Severity),
            length_class: aggregate.class(DensityMetric::Length),
            track_area_class: aggregate.class(DensityMetric::TrackArea),
        }
    }
}

/// Write one level's aggregates; parent names are resolved from `parents`
pub fn write_level_csv<W: Write>(
    writer: W,
    level: &LevelReport,
    parents: Option<&LevelReport>,
) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    for aggregate in &level.aggregates {
        let parent_name = aggregate
            .parent_id
            .as_deref()
            .and_then(|p| parents?.get(p))
            .map(|p| p.name.as_str());
        csv_writer.serialize(AggregateRow::new(aggregate, parent_name))?;
    }

    csv_writer.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct SummaryDoc<'a> {
    generated_at: DateTime<Utc>,
    min_year: i32,
    projection: String,
    run: &'a RunSummary,
    classifications: BTreeMap<RegionLevel, &'a [Classification]>,
}

pub fn write_summary_json<W: Write>(
    writer: W,
    report: &AnalysisReport,
    min_year: i32,
    projection: String,
) -> Result<()> {
    let doc = SummaryDoc {
        generated_at: Utc::now(),
        min_year,
        projection,
        run: &report.summary,
        classifications: [
            (RegionLevel::Fine, report.fine.classifications.as_slice()),
            (RegionLevel::Coarse, report.coarse.classifications.as_slice()),
        ]
        .into_iter()
        .collect(),
    };
    serde_json::to_writer_pretty(writer, &doc)?;
    Ok(())
}

/// Write `fine_aggregates.csv`, `coarse_aggregates.csv` and `summary.json`
pub fn write_outputs(
    out_dir: &Path,
    report: &AnalysisReport,
    min_year: i32,
    projection: String,
) -> Result<()> {
    std::fs::create_dir_all(out_dir).context("Failed to create output directory")?;

    let fine_path = out_dir.join("fine_aggregates.csv");
    write_level_csv(
        File::create(&fine_path).context("Failed to create fine output")?,
        &report.fine,
        Some(&report.coarse),
    )?;

    let coarse_path = out_dir.join("coarse_aggregates.csv");
    write_level_csv(
        File::create(&coarse_path).context("Failed to create coarse output")?,
        &report.coarse,
        None,
    )?;

    let summary_path = out_dir.join("summary.json");
    write_summary_json(
        File::create(&summary_path).context("Failed to create summary")?,
        report,
        min_year,
        projection,
    )?;

    info!("Wrote results to {}", out_dir.display());
    Ok(())
}
