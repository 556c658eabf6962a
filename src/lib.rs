//! Twister - storm track overlay and per-region aggregation
//!
//! This library builds planar track segments from storm records, overlays them
//! on administrative boundaries and produces area-normalized, classified
//! per-region statistics. The `analyze` binary wires it to files.

pub mod aggregate;
pub mod builder;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod error;
pub mod models;
pub mod overlay;
pub mod pipeline;
pub mod projection;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, ExclusionKind, ExclusionSummary};
pub use models::{DensityMetric, RegionAggregate, RegionLevel, RegionPolygon, Severity, TrackSegment};
pub use pipeline::{run_analysis, AnalysisReport, LevelReport, RunSummary};
