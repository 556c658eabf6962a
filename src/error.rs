//! Error kinds and the per-run exclusion ledger.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    /// A required column is missing from a record. Aborts the run.
    #[error("schema mismatch: required field '{field}' missing from record {record}")]
    SchemaMismatch { field: String, record: usize },

    #[error("invalid value '{value}' for field '{field}' in record {record}")]
    InvalidValue {
        field: String,
        value: String,
        record: usize,
    },

    #[error("invalid geometry for region {region}: {reason}")]
    InvalidGeometry { region: String, reason: String },

    #[error("duplicate region identifier {region}")]
    DuplicateRegion { region: String },

    #[error("projection failed for {subject}: {reason}")]
    ProjectionFailure { subject: String, reason: String },

    #[error("region {region} has non-positive area {area}")]
    ZeroAreaRegion { region: String, area: f64 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AnalysisError {
    /// Exclusion category for per-item errors; `None` for fatal ones
    pub fn exclusion_kind(&self) -> Option<ExclusionKind> {
        match self {
            AnalysisError::SchemaMismatch { .. } | AnalysisError::Config(_) => None,
            AnalysisError::InvalidValue { .. } => Some(ExclusionKind::InvalidValue),
            AnalysisError::InvalidGeometry { .. } => Some(ExclusionKind::InvalidGeometry),
            AnalysisError::DuplicateRegion { .. } => Some(ExclusionKind::DuplicateRegion),
            AnalysisError::ProjectionFailure { .. } => Some(ExclusionKind::ProjectionFailure),
            AnalysisError::ZeroAreaRegion { .. } => Some(ExclusionKind::ZeroAreaRegion),
        }
    }
}

/// Why a record or region was left out (or flagged)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionKind {
    /// Endpoint missing or equal to the absent sentinel
    AbsentCoordinate,
    /// Year before the configured cutoff
    BeforeCutoff,
    InvalidValue,
    InvalidGeometry,
    DuplicateRegion,
    ProjectionFailure,
    /// Kept, but densities are unavailable
    ZeroAreaRegion,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exclusion {
    pub kind: ExclusionKind,
    pub subject: String,
    pub reason: String,
}

/// Everything a stage dropped or flagged, with counts by kind
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExclusionSummary {
    pub counts: BTreeMap<ExclusionKind, usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<Exclusion>,
}

impl ExclusionSummary {
    /// Record a quiet data-quality drop (no warning)
    pub fn record(&mut self, kind: ExclusionKind, subject: impl Into<String>, reason: impl Into<String>) {
        *self.counts.entry(kind).or_default() += 1;
        self.entries.push(Exclusion {
            kind,
            subject: subject.into(),
            reason: reason.into(),
        });
    }

    /// Record a recoverable error and log it
    pub fn record_error(&mut self, subject: impl Into<String>, error: &AnalysisError) {
        let subject = subject.into();
        let Some(kind) = error.exclusion_kind() else {
            return;
        };
        warn!("Excluding {}: {}", subject, error);
        self.record(kind, subject, error.to_string());
    }

    pub fn count(&self, kind: ExclusionKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn merge(&mut self, other: ExclusionSummary) {
        for (kind, n) in other.counts {
            *self.counts.entry(kind).or_default() += n;
        }
        self.entries.extend(other.entries);
    }
}
