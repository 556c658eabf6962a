//! Storm track records as they arrive and as the engine sees them.

use std::collections::BTreeMap;
use std::fmt;

use geo::{Coord, Euclidean, Length, Line};
use serde::{Deserialize, Serialize};

/// A raw track record keyed by column name, as handed over by the tabular reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTrackRecord {
    /// 1-based position of the record in its source (used in diagnostics)
    pub line: usize,
    pub fields: BTreeMap<String, String>,
}

impl RawTrackRecord {
    pub fn new(line: usize, fields: BTreeMap<String, String>) -> Self {
        Self { line, fields }
    }

    /// Build a record from `(column, value)` pairs
    pub fn from_pairs<K, V>(line: usize, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            line,
            fields: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Whether the column exists in this record at all
    pub fn has(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Get a trimmed value; empty strings are treated as missing
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Ordinal storm rating (EF/F scale for tornadoes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Unrated,
    Rated(u8),
}

impl Severity {
    /// Numeric contribution to severity sums. Unrated events add nothing.
    pub fn value(&self) -> u64 {
        match self {
            Severity::Unrated => 0,
            Severity::Rated(r) => u64::from(*r),
        }
    }

    pub fn rating(&self) -> Option<u8> {
        match self {
            Severity::Unrated => None,
            Severity::Rated(r) => Some(*r),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Unrated => write!(f, "unrated"),
            Severity::Rated(r) => write!(f, "{}", r),
        }
    }
}

/// Geographic point (lon/lat degrees)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// One storm event's path, reprojected into the working planar system.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSegment {
    /// Unique identifier within a run
    pub id: String,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub time: String,
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub severity: Severity,

    /// Path width in planar units (metres), if reported
    pub width: Option<f64>,

    /// Extra attributes retained from the source record
    pub attributes: BTreeMap<String, String>,

    /// Two-point line in the working projection
    pub geometry: Line<f64>,
}

impl TrackSegment {
    /// Create a segment directly from planar endpoints.
    ///
    /// Geographic endpoints default to the planar ones; the builder overwrites
    /// them with the source coordinates.
    pub fn planar(id: impl Into<String>, from: Coord<f64>, to: Coord<f64>, severity: Severity) -> Self {
        Self {
            id: id.into(),
            year: 0,
            month: 0,
            day: 0,
            time: String::new(),
            start: GeoPoint::new(from.x, from.y),
            end: GeoPoint::new(to.x, to.y),
            severity,
            width: None,
            attributes: BTreeMap::new(),
            geometry: Line::new(from, to),
        }
    }

    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    /// Planar length of the full segment
    pub fn length(&self) -> f64 {
        Euclidean.length(&self.geometry)
    }

    /// A segment whose projected endpoints coincide
    pub fn is_degenerate(&self) -> bool {
        self.geometry.start == self.geometry.end
    }
}
