//! Aggregation engine: overlay pieces to one summary per catalog region.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::catalog::RegionCatalog;
use crate::models::{RegionAggregate, Severity};
use crate::overlay::OverlayResult;

#[derive(Default)]
struct Accumulator<'a> {
    segments: BTreeSet<&'a str>,
    severity: u64,
    length: f64,
    track_area: f64,
    ratings: BTreeMap<Severity, u64>,
}

/// One aggregate per catalog region, in catalog order.
///
/// Count and severity are per distinct segment (a segment touching a region
/// through several pieces counts once); length and track area sum every piece.
/// Pieces are folded in segment order so sums do not depend on scheduling.
pub fn aggregate(overlay: &OverlayResult, catalog: &RegionCatalog) -> Vec<RegionAggregate> {
    let mut acc: BTreeMap<&str, Accumulator> = catalog
        .regions()
        .iter()
        .map(|r| (r.id.as_str(), Accumulator::default()))
        .collect();

    for piece in overlay.pieces() {
        let Some(a) = acc.get_mut(piece.region_id.as_str()) else {
            warn!(
                "Piece of segment {} refers to unknown region {}",
                piece.segment_id, piece.region_id
            );
            continue;
        };

        if a.segments.insert(piece.segment_id.as_str()) {
            a.severity += piece.severity.value();
            *a.ratings.entry(piece.severity).or_default() += 1;
        }
        a.length += piece.length;
        a.track_area += piece.track_area();
    }

    let aggregates: Vec<RegionAggregate> = catalog
        .regions()
        .iter()
        .map(|region| {
            let mut out = RegionAggregate::empty(&region.id, region.level, &region.name, region.area);
            out.parent_id = region.parent_id.clone();

            if let Some(a) = acc.remove(region.id.as_str()) {
                out.event_count = a.segments.len() as u64;
                out.total_severity = a.severity;
                out.total_length = a.length;
                out.total_track_area = a.track_area;
                out.max_rating = a.ratings.keys().next_back().copied();
                out.rating_counts = a.ratings;
            }
            out
        })
        .collect();

    let touched = aggregates.iter().filter(|a| a.event_count > 0).count();
    debug!("{} of {} regions touched", touched, aggregates.len());
    info!(
        "Aggregated {} {} regions",
        aggregates.len(),
        catalog.level().field_name()
    );

    aggregates
}
