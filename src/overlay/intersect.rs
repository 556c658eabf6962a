//! Segment/polygon intersection capability.

use geo::{BooleanOps, Coord, Line, LineString, MultiLineString, MultiPolygon};

/// Clips a straight segment against a polygon set.
///
/// Implementations return the parts of `segment` inside `polygon`, ordered
/// from the segment's start towards its end and oriented the same way.
pub trait Intersector: Send + Sync {
    fn intersect(&self, segment: &Line<f64>, polygon: &MultiPolygon<f64>) -> Vec<LineString<f64>>;
}

/// Intersector backed by `geo`'s boolean-ops line clipping
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipIntersector;

impl Intersector for ClipIntersector {
    fn intersect(&self, segment: &Line<f64>, polygon: &MultiPolygon<f64>) -> Vec<LineString<f64>> {
        let line = MultiLineString::new(vec![LineString::new(vec![segment.start, segment.end])]);
        let clipped = polygon.clip(&line, false);

        let mut pieces: Vec<(f64, LineString<f64>)> = clipped
            .0
            .into_iter()
            .filter(|ls| ls.0.len() >= 2)
            .map(|mut ls| {
                let first = along(segment, ls.0[0]);
                let last = along(segment, ls.0[ls.0.len() - 1]);
                if first > last {
                    ls.0.reverse();
                }
                (first.min(last), ls)
            })
            .collect();

        pieces.sort_by(|a, b| a.0.total_cmp(&b.0));
        pieces.into_iter().map(|(_, ls)| ls).collect()
    }
}

/// Interval `[t0, t1]` of the segment covered by a clipped part
pub(crate) fn span(segment: &Line<f64>, part: &LineString<f64>) -> Option<(f64, f64)> {
    let first = along(segment, *part.0.first()?).clamp(0.0, 1.0);
    let last = along(segment, *part.0.last()?).clamp(0.0, 1.0);
    Some((first.min(last), first.max(last)))
}

/// Position of `c` projected onto the segment, as a fraction of its length
fn along(segment: &Line<f64>, c: Coord<f64>) -> f64 {
    let d = segment.delta();
    let len2 = d.x * d.x + d.y * d.y;
    if len2 == 0.0 {
        return 0.0;
    }
    ((c.x - segment.start.x) * d.x + (c.y - segment.start.y) * d.y) / len2
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Euclidean, Length};

    fn square(x: f64, y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]])
    }

    fn total(pieces: &[LineString<f64>]) -> f64 {
        pieces.iter().map(|p| Euclidean.length(p)).sum()
    }

    #[test]
    fn test_inside() {
        let seg = Line::new(Coord { x: 1.0, y: 5.0 }, Coord { x: 9.0, y: 5.0 });
        let pieces = ClipIntersector.intersect(&seg, &square(0.0, 0.0, 10.0));
        assert_eq!(pieces.len(), 1);
        assert!((total(&pieces) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_outside() {
        let seg = Line::new(Coord { x: 20.0, y: 5.0 }, Coord { x: 30.0, y: 5.0 });
        assert!(ClipIntersector.intersect(&seg, &square(0.0, 0.0, 10.0)).is_empty());
    }

    #[test]
    fn test_crossing_is_clipped() {
        let seg = Line::new(Coord { x: -5.0, y: 5.0 }, Coord { x: 15.0, y: 5.0 });
        let pieces = ClipIntersector.intersect(&seg, &square(0.0, 0.0, 10.0));
        assert!((total(&pieces) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_hole_splits_into_ordered_pieces() {
        let donut = MultiPolygon::new(vec![polygon!(
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
        )]);

        // Run right-to-left so ordering has to follow the segment direction
        let seg = Line::new(Coord { x: 10.0, y: 5.0 }, Coord { x: 0.0, y: 5.0 });
        let pieces = ClipIntersector.intersect(&seg, &donut);

        assert_eq!(pieces.len(), 2);
        assert!((total(&pieces) - 8.0).abs() < 1e-9);
        assert!(pieces[0].0[0].x > pieces[1].0[0].x);
        assert!(pieces[0].0[0].x > pieces[0].0[1].x);
    }
}
