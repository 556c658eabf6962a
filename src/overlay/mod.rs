//! Overlay engine: distributes each track segment across the regions it crosses.
//!
//! Work is independent per segment and only reads the catalog, so segments
//! are processed on the rayon pool. Results come back in segment order.

mod intersect;

use std::collections::{BTreeMap, BTreeSet};

use geo::{BoundingRect, Contains, Intersects, Point};
use indicatif::ProgressBar;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::catalog::RegionCatalog;
use crate::models::{RegionLevel, Severity, TrackSegment};

pub use intersect::{ClipIntersector, Intersector};

use intersect::span;

/// Cut points closer than this fraction of the segment are merged
const TOUCH_TOLERANCE: f64 = 1e-9;

/// Part of one segment inside one region
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayPiece {
    pub region_id: String,
    pub segment_id: String,
    pub length: f64,
    pub severity: Severity,
    pub width: Option<f64>,
}

impl OverlayPiece {
    /// Swept area of this piece; zero when the width is unknown
    pub fn track_area(&self) -> f64 {
        self.length * self.width.unwrap_or(0.0)
    }
}

/// Overlay result for a single segment
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentOverlay {
    pub segment_id: String,
    pub segment_length: f64,
    pub pieces: Vec<OverlayPiece>,

    /// Length falling outside every region
    pub uncovered_length: f64,
}

impl SegmentOverlay {
    pub fn touched_regions(&self) -> BTreeSet<&str> {
        self.pieces.iter().map(|p| p.region_id.as_str()).collect()
    }

    pub fn covered_length(&self) -> f64 {
        self.pieces.iter().map(|p| p.length).sum()
    }
}

/// Overlay of all segments against one catalog, in segment order
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayResult {
    pub level: RegionLevel,
    pub segments: Vec<SegmentOverlay>,
}

impl OverlayResult {
    pub fn pieces(&self) -> impl Iterator<Item = &OverlayPiece> {
        self.segments.iter().flat_map(|s| s.pieces.iter())
    }

    /// Segment identifier to the set of regions it touches
    pub fn touches(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        self.segments
            .iter()
            .map(|s| (s.segment_id.as_str(), s.touched_regions()))
            .collect()
    }

    /// Total length outside all regions, summed in segment order
    pub fn uncovered_length(&self) -> f64 {
        self.segments.iter().map(|s| s.uncovered_length).sum()
    }

    /// Segments that touched no region at all
    pub fn untouched_segments(&self) -> usize {
        self.segments.iter().filter(|s| s.pieces.is_empty()).count()
    }
}

pub struct OverlayEngine<'a, I = ClipIntersector> {
    catalog: &'a RegionCatalog,
    intersector: I,
    parallel: bool,
    progress: Option<ProgressBar>,
}

impl<'a> OverlayEngine<'a, ClipIntersector> {
    pub fn new(catalog: &'a RegionCatalog) -> Self {
        Self {
            catalog,
            intersector: ClipIntersector,
            parallel: true,
            progress: None,
        }
    }
}

impl<'a, I: Intersector> OverlayEngine<'a, I> {
    /// Swap the intersection routine
    pub fn with_intersector<J: Intersector>(self, intersector: J) -> OverlayEngine<'a, J> {
        OverlayEngine {
            catalog: self.catalog,
            intersector,
            parallel: self.parallel,
            progress: self.progress,
        }
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Overlay every segment against the catalog
    pub fn run(&self, segments: &[TrackSegment]) -> OverlayResult {
        info!(
            "Overlaying {} segments on {} {} regions...",
            segments.len(),
            self.catalog.len(),
            self.catalog.level().field_name()
        );

        let results: Vec<SegmentOverlay> = if self.parallel {
            segments
                .par_iter()
                .map(|s| self.overlay_tracked(s))
                .collect()
        } else {
            segments.iter().map(|s| self.overlay_tracked(s)).collect()
        };

        if let Some(pb) = &self.progress {
            pb.finish_with_message("Overlay complete");
        }

        let result = OverlayResult {
            level: self.catalog.level(),
            segments: results,
        };

        info!(
            "Overlay produced {} pieces ({} segments outside all regions)",
            result.pieces().count(),
            result.untouched_segments()
        );

        result
    }

    fn overlay_tracked(&self, segment: &TrackSegment) -> SegmentOverlay {
        let overlay = self.overlay_segment(segment);
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
        overlay
    }

    /// Distribute one segment across the catalog's regions.
    ///
    /// Clipped parts are cut into intervals along the segment and every
    /// interval goes to exactly one region: the first covering region whose
    /// interior holds its midpoint, else (a run along a boundary) the lowest
    /// covering slot.
    pub fn overlay_segment(&self, segment: &TrackSegment) -> SegmentOverlay {
        let segment_length = segment.length();

        if segment.is_degenerate() || segment_length == 0.0 {
            return self.overlay_point(segment);
        }

        let candidates = self
            .catalog
            .index()
            .candidates(segment.geometry.bounding_rect());

        let mut cuts = vec![0.0, 1.0];
        let mut covering: Vec<(usize, Vec<(f64, f64)>)> = Vec::new();
        for slot in candidates {
            let region = self.catalog.slot(slot);
            let spans: Vec<(f64, f64)> = self
                .intersector
                .intersect(&segment.geometry, &region.geometry)
                .iter()
                .filter_map(|part| span(&segment.geometry, part))
                .collect();
            for &(t0, t1) in &spans {
                cuts.push(t0);
                cuts.push(t1);
            }
            if !spans.is_empty() {
                covering.push((slot, spans));
            }
        }

        cuts.sort_by(f64::total_cmp);
        let mut breaks: Vec<f64> = Vec::with_capacity(cuts.len());
        for t in cuts {
            if breaks.last().map_or(true, |&last| t - last > TOUCH_TOLERANCE) {
                breaks.push(t);
            }
        }

        // (slot, t0, t1), consecutive intervals of one region merged
        let mut spans: Vec<(usize, f64, f64)> = Vec::new();
        for w in breaks.windows(2) {
            let (t0, t1) = (w[0], w[1]);
            let Some(slot) = self.owner(segment, &covering, (t0 + t1) / 2.0) else {
                continue;
            };
            match spans.last_mut() {
                Some(last) if last.0 == slot && last.2 == t0 => last.2 = t1,
                _ => spans.push((slot, t0, t1)),
            }
        }

        let pieces: Vec<OverlayPiece> = spans
            .into_iter()
            .map(|(slot, t0, t1)| OverlayPiece {
                region_id: self.catalog.slot(slot).id.clone(),
                segment_id: segment.id.clone(),
                length: (t1 - t0) * segment_length,
                severity: segment.severity,
                width: segment.width,
            })
            .collect();

        let covered: f64 = pieces.iter().map(|p| p.length).sum();
        let uncovered_length = (segment_length - covered).max(0.0);
        if uncovered_length > segment_length * TOUCH_TOLERANCE {
            debug!(
                "Segment {} has {:.1} of {:.1} outside all regions",
                segment.id, uncovered_length, segment_length
            );
        }

        SegmentOverlay {
            segment_id: segment.id.clone(),
            segment_length,
            pieces,
            uncovered_length,
        }
    }

    /// Region owning the point at fraction `t` of the segment, among the
    /// regions whose clipped parts cover it
    fn owner(&self, segment: &TrackSegment, covering: &[(usize, Vec<(f64, f64)>)], t: f64) -> Option<usize> {
        let mut covers = covering
            .iter()
            .filter(|(_, spans)| spans.iter().any(|&(t0, t1)| t0 <= t && t <= t1))
            .map(|(slot, _)| *slot)
            .peekable();
        let lowest = *covers.peek()?;

        let line = &segment.geometry;
        let point = Point::from(line.start + line.delta() * t);
        Some(
            covers
                .find(|&slot| self.catalog.slot(slot).geometry.contains(&point))
                .unwrap_or(lowest),
        )
    }

    /// Zero-length segment: attributed to the first region containing its point
    fn overlay_point(&self, segment: &TrackSegment) -> SegmentOverlay {
        let at = segment.geometry.start;
        let point = Point::from(at);

        let owner = self
            .catalog
            .index()
            .candidates_at(at)
            .into_iter()
            .map(|slot| self.catalog.slot(slot))
            .find(|region| region.geometry.intersects(&point));

        let pieces = owner
            .map(|region| {
                vec![OverlayPiece {
                    region_id: region.id.clone(),
                    segment_id: segment.id.clone(),
                    length: 0.0,
                    severity: segment.severity,
                    width: segment.width,
                }]
            })
            .unwrap_or_default();

        SegmentOverlay {
            segment_id: segment.id.clone(),
            segment_length: 0.0,
            pieces,
            uncovered_length: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RegionPolygon;
    use geo::{polygon, Coord, Line, LineString, MultiPolygon};

    fn rect(id: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> RegionPolygon {
        let p = polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ];
        RegionPolygon::new(id, RegionLevel::Fine, id, MultiPolygon::new(vec![p]))
    }

    fn seg(id: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> TrackSegment {
        TrackSegment::planar(
            id,
            Coord { x: x0, y: y0 },
            Coord { x: x1, y: y1 },
            Severity::Rated(2),
        )
    }

    fn catalog() -> RegionCatalog {
        RegionCatalog::from_regions(
            RegionLevel::Fine,
            vec![
                rect("A", 0.0, 0.0, 30.0, 10.0),
                rect("B", 30.0, 0.0, 60.0, 10.0),
                rect("C", 0.0, 100.0, 10.0, 110.0),
            ],
        )
    }

    #[test]
    fn test_inside_one_region() {
        let catalog = catalog();
        let overlay = OverlayEngine::new(&catalog).overlay_segment(&seg("s1", 5.0, 5.0, 25.0, 5.0));
        assert_eq!(overlay.pieces.len(), 1);
        assert_eq!(overlay.pieces[0].region_id, "A");
        assert!((overlay.pieces[0].length - 20.0).abs() < 1e-9);
        assert_eq!(overlay.uncovered_length, 0.0);
    }

    #[test]
    fn test_crossing_splits_by_region() {
        let catalog = catalog();
        let overlay = OverlayEngine::new(&catalog).overlay_segment(&seg("s1", 0.0, 5.0, 50.0, 5.0));

        let by_region: BTreeMap<&str, f64> = overlay
            .pieces
            .iter()
            .map(|p| (p.region_id.as_str(), p.length))
            .collect();
        assert!((by_region["A"] - 30.0).abs() < 1e-6);
        assert!((by_region["B"] - 20.0).abs() < 1e-6);
        assert!((overlay.covered_length() - overlay.segment_length).abs() < 1e-6);
        assert_eq!(overlay.touched_regions().len(), 2);
    }

    #[test]
    fn test_outside_portion_is_uncovered() {
        let catalog = catalog();
        let overlay = OverlayEngine::new(&catalog).overlay_segment(&seg("s1", 50.0, 5.0, 80.0, 5.0));
        assert_eq!(overlay.pieces.len(), 1);
        assert!((overlay.pieces[0].length - 10.0).abs() < 1e-6);
        assert!((overlay.uncovered_length - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_run_along_shared_edge_counted_once() {
        let catalog = catalog();
        let overlay = OverlayEngine::new(&catalog).overlay_segment(&seg("s1", 30.0, 2.0, 30.0, 8.0));

        assert_eq!(overlay.pieces.len(), 1);
        assert_eq!(overlay.pieces[0].region_id, "A");
        assert!((overlay.covered_length() - 6.0).abs() < 1e-9);
        assert_eq!(overlay.uncovered_length, 0.0);
    }

    #[test]
    fn test_run_along_outer_edge_split_at_corner() {
        let catalog = catalog();
        let overlay = OverlayEngine::new(&catalog).overlay_segment(&seg("s1", 20.0, 0.0, 40.0, 0.0));

        let by_region: BTreeMap<&str, f64> = overlay
            .pieces
            .iter()
            .map(|p| (p.region_id.as_str(), p.length))
            .collect();
        assert_eq!(by_region.len(), 2);
        assert!((by_region["A"] - 10.0).abs() < 1e-9);
        assert!((by_region["B"] - 10.0).abs() < 1e-9);
        assert!((overlay.covered_length() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_run_along_hole_ring_counted_once() {
        let donut = polygon!(
            exterior: [
                (x: 0.0, y: 0.0),
                (x: 10.0, y: 0.0),
                (x: 10.0, y: 10.0),
                (x: 0.0, y: 10.0),
            ],
            interiors: [
                [
                    (x: 4.0, y: 4.0),
                    (x: 6.0, y: 4.0),
                    (x: 6.0, y: 6.0),
                    (x: 4.0, y: 6.0),
                ],
            ],
        );
        let island = rect("I", 4.0, 4.0, 6.0, 6.0);
        let catalog = RegionCatalog::from_regions(
            RegionLevel::Fine,
            vec![
                RegionPolygon::new("D", RegionLevel::Fine, "D", MultiPolygon::new(vec![donut])),
                island,
            ],
        );
        let engine = OverlayEngine::new(&catalog);

        let along = engine.overlay_segment(&seg("s1", 4.0, 4.5, 4.0, 5.5));
        assert_eq!(along.pieces.len(), 1);
        assert_eq!(along.pieces[0].region_id, "D");
        assert!((along.covered_length() - 1.0).abs() < 1e-9);

        // Crossing the island: donut, island, donut
        let across = engine.overlay_segment(&seg("s2", 1.0, 5.0, 9.0, 5.0));
        let regions: Vec<&str> = across.pieces.iter().map(|p| p.region_id.as_str()).collect();
        assert_eq!(regions, vec!["D", "I", "D"]);
        assert!((across.covered_length() - 8.0).abs() < 1e-9);
        assert_eq!(across.touched_regions().len(), 2);
    }

    #[test]
    fn test_degenerate_segment_attributed_to_containing_region() {
        let catalog = catalog();
        let engine = OverlayEngine::new(&catalog);

        let overlay = engine.overlay_segment(&seg("p", 5.0, 105.0, 5.0, 105.0));
        assert_eq!(overlay.pieces.len(), 1);
        assert_eq!(overlay.pieces[0].region_id, "C");
        assert_eq!(overlay.pieces[0].length, 0.0);

        let nowhere = engine.overlay_segment(&seg("q", 500.0, 500.0, 500.0, 500.0));
        assert!(nowhere.pieces.is_empty());
        assert_eq!(nowhere.uncovered_length, 0.0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let catalog = catalog();
        let segments: Vec<TrackSegment> = (0..200)
            .map(|i| {
                let x = (i % 60) as f64;
                seg(&format!("s{}", i), x, 1.0 + (i % 8) as f64, x + 17.3, 2.0)
            })
            .collect();

        let parallel = OverlayEngine::new(&catalog).run(&segments);
        let sequential = OverlayEngine::new(&catalog).parallel(false).run(&segments);
        assert_eq!(parallel, sequential);
        assert_eq!(parallel.segments.len(), 200);
        assert_eq!(parallel.touches().len(), 200);
    }

    struct NothingIntersects;

    impl Intersector for NothingIntersects {
        fn intersect(&self, _: &Line<f64>, _: &MultiPolygon<f64>) -> Vec<LineString<f64>> {
            Vec::new()
        }
    }

    #[test]
    fn test_pluggable_intersector() {
        let catalog = catalog();
        let engine = OverlayEngine::new(&catalog).with_intersector(NothingIntersects);
        let result = engine.run(&[seg("s1", 5.0, 5.0, 25.0, 5.0)]);
        assert_eq!(result.untouched_segments(), 1);
        assert!((result.uncovered_length() - 20.0).abs() < 1e-9);
    }
}
