//! Per-region summary produced by aggregation and enriched by normalization.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{RegionLevel, Severity};

/// Per-unit-area statistic that can be computed and classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DensityMetric {
    /// Event count / area
    Events,
    /// Summed severity / area
    Severity,
    /// Summed track length / area
    Length,
    /// Summed track area (length x width) / area
    TrackArea,
}

impl DensityMetric {
    pub fn all() -> &'static [DensityMetric] {
        &[
            DensityMetric::Events,
            DensityMetric::Severity,
            DensityMetric::Length,
            DensityMetric::TrackArea,
        ]
    }

    /// Get the field name for this metric
    pub fn field_name(&self) -> &'static str {
        match self {
            DensityMetric::Events => "events_per_area",
            DensityMetric::Severity => "severity_per_area",
            DensityMetric::Length => "length_per_area",
            DensityMetric::TrackArea => "track_area_per_area",
        }
    }
}

/// Densities for one region. `None` means unavailable (zero or invalid area).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DensityMetrics {
    pub events_per_area: Option<f64>,
    pub severity_per_area: Option<f64>,
    pub length_per_area: Option<f64>,
    pub track_area_per_area: Option<f64>,
}

impl DensityMetrics {
    pub fn get(&self, metric: DensityMetric) -> Option<f64> {
        match metric {
            DensityMetric::Events => self.events_per_area,
            DensityMetric::Severity => self.severity_per_area,
            DensityMetric::Length => self.length_per_area,
            DensityMetric::TrackArea => self.track_area_per_area,
        }
    }

    pub fn is_available(&self) -> bool {
        self.events_per_area.is_some()
    }
}

/// Summary for one region of one catalog
#[derive(Debug, Clone, PartialEq)]
pub struct RegionAggregate {
    pub region_id: String,
    pub level: RegionLevel,
    pub name: String,
    pub parent_id: Option<String>,

    /// Distinct segments touching the region
    pub event_count: u64,

    /// Full severity of every touching segment
    pub total_severity: u64,

    /// Sum of intersected piece lengths
    pub total_length: f64,

    /// Sum of piece length x segment width
    pub total_track_area: f64,

    /// Planar area of the region
    pub area: f64,

    /// Touching segments per rating
    pub rating_counts: BTreeMap<Severity, u64>,
    pub max_rating: Option<Severity>,

    pub densities: DensityMetrics,

    /// Class bin per classified metric
    pub classes: BTreeMap<DensityMetric, usize>,
}

impl RegionAggregate {
    /// Zero-valued aggregate for a region nothing touched
    pub fn empty(
        region_id: impl Into<String>,
        level: RegionLevel,
        name: impl Into<String>,
        area: f64,
    ) -> Self {
        Self {
            region_id: region_id.into(),
            level,
            name: name.into(),
            parent_id: None,
            event_count: 0,
            total_severity: 0,
            total_length: 0.0,
            total_track_area: 0.0,
            area,
            rating_counts: BTreeMap::new(),
            max_rating: None,
            densities: DensityMetrics::default(),
            classes: BTreeMap::new(),
        }
    }

    pub fn density(&self, metric: DensityMetric) -> Option<f64> {
        self.densities.get(metric)
    }

    pub fn class(&self, metric: DensityMetric) -> Option<usize> {
        self.classes.get(&metric).copied()
    }
}
