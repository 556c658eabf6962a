//! Core data models for the overlay engine.

pub mod aggregate;
pub mod region;
pub mod track;

pub use aggregate::{DensityMetric, DensityMetrics, RegionAggregate};
pub use region::{RawRegionRecord, RegionLevel, RegionPolygon};
pub use track::{GeoPoint, RawTrackRecord, Severity, TrackSegment};
