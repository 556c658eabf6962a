//! Run configuration, threaded explicitly through every stage.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::AnalysisError;
use crate::models::DensityMetric;
use crate::projection::CrsSpec;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    pub projection: ProjectionConfig,

    /// Records before this year are dropped
    pub min_year: i32,

    pub fields: TrackFields,

    /// Extra columns copied onto each segment (all required)
    pub retain_fields: Vec<String>,

    /// Rating value meaning "unrated"
    pub unrated_sentinel: i64,

    /// Coordinate value meaning "unknown"
    pub absent_coordinate: f64,

    pub width_unit: WidthUnit,

    pub boundaries: BoundaryFields,

    pub classification: ClassificationConfig,

    pub diagnostics: DiagnosticsConfig,

    /// Run the overlay on the rayon pool
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            projection: ProjectionConfig::default(),
            min_year: 1950,
            fields: TrackFields::default(),
            retain_fields: Vec::new(),
            unrated_sentinel: -9,
            absent_coordinate: 0.0,
            width_unit: WidthUnit::Yards,
            boundaries: BoundaryFields::default(),
            classification: ClassificationConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
            parallel: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProjectionConfig {
    /// CRS of the input coordinates
    pub source: CrsSpec,
    /// Planar equal-area working CRS
    pub target: CrsSpec,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            source: CrsSpec::Epsg(4326),
            target: CrsSpec::Epsg(5070),
        }
    }
}

/// Column names of the track table (SPC defaults)
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct TrackFields {
    pub id: String,
    pub year: String,
    pub month: String,
    pub day: String,
    pub time: String,
    pub start_lat: String,
    pub start_lon: String,
    pub end_lat: String,
    pub end_lon: String,
    pub severity: String,
    /// Optional column; absent or blank means no width
    pub width: String,
}

impl Default for TrackFields {
    fn default() -> Self {
        Self {
            id: "om".to_string(),
            year: "yr".to_string(),
            month: "mo".to_string(),
            day: "dy".to_string(),
            time: "time".to_string(),
            start_lat: "slat".to_string(),
            start_lon: "slon".to_string(),
            end_lat: "elat".to_string(),
            end_lon: "elon".to_string(),
            severity: "mag".to_string(),
            width: "wid".to_string(),
        }
    }
}

impl TrackFields {
    /// Columns every record must carry
    pub fn required(&self) -> [&str; 10] {
        [
            &self.id,
            &self.year,
            &self.month,
            &self.day,
            &self.time,
            &self.start_lat,
            &self.start_lon,
            &self.end_lat,
            &self.end_lon,
            &self.severity,
        ]
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WidthUnit {
    Yards,
    Meters,
}

impl WidthUnit {
    pub fn to_meters(&self, width: f64) -> f64 {
        match self {
            WidthUnit::Yards => width * 0.9144,
            WidthUnit::Meters => width,
        }
    }
}

/// Feature property names read from boundary files
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BoundaryFields {
    pub fine: LevelFields,
    pub coarse: LevelFields,
}

impl Default for BoundaryFields {
    fn default() -> Self {
        Self {
            fine: LevelFields {
                id: "GEOID".to_string(),
                name: "NAME".to_string(),
                parent: Some("STATEFP".to_string()),
            },
            coarse: LevelFields {
                id: "GEOID".to_string(),
                name: "NAME".to_string(),
                parent: None,
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LevelFields {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ClassificationConfig {
    pub bins: usize,
    pub metrics: Vec<DensityMetric>,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            bins: 5,
            metrics: vec![
                DensityMetric::Events,
                DensityMetric::Severity,
                DensityMetric::Length,
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Report track length that falls outside every region
    pub report_uncovered_length: bool,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            report_uncovered_length: true,
        }
    }
}

impl AnalysisConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: AnalysisConfig =
            toml::from_str(&content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.classification.bins == 0 {
            return Err(AnalysisError::Config(
                "classification.bins must be at least 1".to_string(),
            ));
        }

        let required = self.fields.required();
        if let Some(blank) = required
            .iter()
            .copied()
            .chain(std::iter::once(self.fields.width.as_str()))
            .chain(self.retain_fields.iter().map(String::as_str))
            .find(|f| f.trim().is_empty())
        {
            return Err(AnalysisError::Config(format!(
                "field names must not be blank (got '{}')",
                blank
            )));
        }

        if !self.absent_coordinate.is_finite() {
            return Err(AnalysisError::Config(
                "absent_coordinate must be finite".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_spc_layout() {
        let config = AnalysisConfig::default();
        assert_eq!(config.min_year, 1950);
        assert_eq!(config.fields.start_lat, "slat");
        assert_eq!(config.unrated_sentinel, -9);
        assert_eq!(config.projection.target, CrsSpec::Epsg(5070));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: AnalysisConfig = toml::from_str(
            r#"
            min_year = 2000
            retain_fields = ["st", "fat"]
            width_unit = "meters"

            [projection]
            target = "+proj=laea +lat_0=45 +lon_0=-100 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs"

            [classification]
            bins = 4
            metrics = ["length", "track_area"]
            "#,
        )
        .unwrap();

        assert_eq!(config.min_year, 2000);
        assert_eq!(config.retain_fields, vec!["st", "fat"]);
        assert_eq!(config.width_unit, WidthUnit::Meters);
        assert_eq!(config.projection.source, CrsSpec::Epsg(4326));
        assert!(matches!(config.projection.target, CrsSpec::Proj4(_)));
        assert_eq!(config.classification.bins, 4);
        assert_eq!(
            config.classification.metrics,
            vec![DensityMetric::Length, DensityMetric::TrackArea]
        );
        assert!(config.diagnostics.report_uncovered_length);
    }

    #[test]
    fn test_zero_bins_rejected() {
        let mut config = AnalysisConfig::default();
        config.classification.bins = 0;
        assert!(matches!(config.validate(), Err(AnalysisError::Config(_))));
    }

    #[test]
    fn test_blank_retained_field_rejected() {
        let mut config = AnalysisConfig::default();
        config.retain_fields.push(" ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_width_conversion() {
        assert!((WidthUnit::Yards.to_meters(100.0) - 91.44).abs() < 1e-9);
        assert_eq!(WidthUnit::Meters.to_meters(100.0), 100.0);
    }
}
