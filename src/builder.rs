//! Geometry builder: raw track records to planar track segments.

use std::collections::BTreeMap;
use std::str::FromStr;

use geo::Line;
use hashbrown::HashSet;
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, ExclusionKind, ExclusionSummary};
use crate::models::{GeoPoint, RawTrackRecord, Severity, TrackSegment};
use crate::projection::Projector;

/// Output of one builder pass
#[derive(Debug, Clone, Default)]
pub struct SegmentBuild {
    pub segments: Vec<TrackSegment>,
    pub records_read: usize,
    pub exclusions: ExclusionSummary,
}

/// Check that every record carries every required column.
///
/// Runs before any record is built: a schema problem rejects the whole input.
pub fn check_schema(records: &[RawTrackRecord], config: &AnalysisConfig) -> Result<(), AnalysisError> {
    let required = config.fields.required();
    let retained = config.retain_fields.iter().map(String::as_str);

    let fields: Vec<&str> = required.iter().copied().chain(retained).collect();

    for record in records {
        if let Some(missing) = fields.iter().find(|f| !record.has(f)) {
            return Err(AnalysisError::SchemaMismatch {
                field: missing.to_string(),
                record: record.line,
            });
        }
    }

    Ok(())
}

/// Build one segment per usable record
pub fn build_segments(
    records: &[RawTrackRecord],
    config: &AnalysisConfig,
    projector: &Projector,
) -> Result<SegmentBuild, AnalysisError> {
    config.validate()?;
    check_schema(records, config)?;

    info!("Building track segments from {} records...", records.len());

    let mut build = SegmentBuild {
        records_read: records.len(),
        ..Default::default()
    };
    let mut issued_ids: HashSet<String> = HashSet::new();

    for record in records {
        let subject = format!("record {}", record.line);

        match build_one(record, config, projector) {
            Ok(Built::Segment(mut segment)) => {
                if issued_ids.contains(&segment.id) {
                    let unique = (2..)
                        .map(|n| format!("{}#{}", segment.id, n))
                        .find(|candidate| !issued_ids.contains(candidate))
                        .unwrap_or_default();
                    debug!("Duplicate track id {} renamed to {}", segment.id, unique);
                    segment.id = unique;
                }
                issued_ids.insert(segment.id.clone());
                build.segments.push(segment);
            }
            Ok(Built::Skipped(kind, reason)) => build.exclusions.record(kind, subject, reason),
            Err(e) => build.exclusions.record_error(subject, &e),
        }
    }

    info!(
        "Built {} segments ({} absent coordinates, {} before {}, {} invalid, {} unprojectable)",
        build.segments.len(),
        build.exclusions.count(ExclusionKind::AbsentCoordinate),
        build.exclusions.count(ExclusionKind::BeforeCutoff),
        config.min_year,
        build.exclusions.count(ExclusionKind::InvalidValue),
        build.exclusions.count(ExclusionKind::ProjectionFailure),
    );

    Ok(build)
}

enum Built {
    Segment(TrackSegment),
    Skipped(ExclusionKind, String),
}

fn build_one(
    record: &RawTrackRecord,
    config: &AnalysisConfig,
    projector: &Projector,
) -> Result<Built, AnalysisError> {
    let fields = &config.fields;

    let year: i32 = parse_required(record, &fields.year)?;
    if year < config.min_year {
        return Ok(Built::Skipped(
            ExclusionKind::BeforeCutoff,
            format!("year {} before {}", year, config.min_year),
        ));
    }

    let start = endpoint(record, &fields.start_lon, &fields.start_lat, config.absent_coordinate)?;
    let end = endpoint(record, &fields.end_lon, &fields.end_lat, config.absent_coordinate)?;
    let (start, end) = match (start, end) {
        (Some(s), Some(e)) => (s, e),
        (None, _) => {
            return Ok(Built::Skipped(
                ExclusionKind::AbsentCoordinate,
                "start point absent".to_string(),
            ))
        }
        (_, None) => {
            return Ok(Built::Skipped(
                ExclusionKind::AbsentCoordinate,
                "end point absent".to_string(),
            ))
        }
    };

    let id = record.get(&fields.id).unwrap_or_default().to_string();
    if id.is_empty() {
        return Err(invalid(record, &fields.id, ""));
    }

    let month: u32 = parse_required(record, &fields.month)?;
    let day: u32 = parse_required(record, &fields.day)?;
    let time = record.get(&fields.time).unwrap_or_default().to_string();
    let severity = severity(record, &fields.severity, config.unrated_sentinel)?;

    let width = match record.get(&fields.width) {
        None => None,
        Some(raw) => {
            let w: f64 = raw
                .parse()
                .map_err(|_| invalid(record, &fields.width, raw))?;
            // Zero is the archive's "unknown width"
            if !w.is_finite() || w < 0.0 {
                return Err(invalid(record, &fields.width, raw));
            }
            (w > 0.0).then(|| config.width_unit.to_meters(w))
        }
    };

    let attributes: BTreeMap<String, String> = config
        .retain_fields
        .iter()
        .map(|f| (f.clone(), record.get(f).unwrap_or_default().to_string()))
        .collect();

    let project = |p: GeoPoint| {
        projector
            .project(p.lon, p.lat)
            .map_err(|reason| AnalysisError::ProjectionFailure {
                subject: format!("track {} ({}, {})", id, p.lon, p.lat),
                reason,
            })
    };
    let geometry = Line::new(project(start)?, project(end)?);

    Ok(Built::Segment(TrackSegment {
        id,
        year,
        month,
        day,
        time,
        start,
        end,
        severity,
        width,
        attributes,
        geometry,
    }))
}

fn invalid(record: &RawTrackRecord, field: &str, value: &str) -> AnalysisError {
    AnalysisError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        record: record.line,
    }
}

fn parse_required<T: FromStr>(record: &RawTrackRecord, field: &str) -> Result<T, AnalysisError> {
    let raw = record.get(field).unwrap_or_default();
    raw.parse().map_err(|_| invalid(record, field, raw))
}

/// Parse one endpoint; `None` when blank or equal to the absent sentinel
fn endpoint(
    record: &RawTrackRecord,
    lon_field: &str,
    lat_field: &str,
    absent: f64,
) -> Result<Option<GeoPoint>, AnalysisError> {
    let (Some(lon), Some(lat)) = (record.get(lon_field), record.get(lat_field)) else {
        return Ok(None);
    };

    let lon: f64 = lon.parse().map_err(|_| invalid(record, lon_field, lon))?;
    let lat: f64 = lat.parse().map_err(|_| invalid(record, lat_field, lat))?;

    if lon == absent || lat == absent {
        return Ok(None);
    }

    Ok(Some(GeoPoint::new(lon, lat)))
}

fn severity(record: &RawTrackRecord, field: &str, unrated: i64) -> Result<Severity, AnalysisError> {
    let Some(raw) = record.get(field) else {
        return Ok(Severity::Unrated);
    };
    let value: i64 = raw.parse().map_err(|_| invalid(record, field, raw))?;
    if value == unrated {
        return Ok(Severity::Unrated);
    }
    u8::try_from(value)
        .map(Severity::Rated)
        .map_err(|_| invalid(record, field, raw))
}
