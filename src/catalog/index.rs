//! Spatial index for fast region candidate lookups.

use geo::{Coord, Rect};
use rstar::{RTree, RTreeObject, AABB};
use tracing::debug;

use crate::models::RegionPolygon;

/// R-tree entry pointing back at a catalog slot
#[derive(Clone)]
struct IndexedRegion {
    slot: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedRegion {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Bounding-box index over a catalog's regions
pub struct RegionSpatialIndex {
    tree: RTree<IndexedRegion>,
}

impl RegionSpatialIndex {
    /// Build from regions in catalog order; slots are positions in `regions`
    pub fn build(regions: &[RegionPolygon]) -> Self {
        let indexed: Vec<IndexedRegion> = regions
            .iter()
            .enumerate()
            .filter_map(|(slot, region)| {
                let rect = region.bbox()?;
                Some(IndexedRegion {
                    slot,
                    envelope: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                })
            })
            .collect();

        let tree = RTree::bulk_load(indexed);
        debug!("Region index built with {} entries", tree.size());

        Self { tree }
    }

    /// Slots whose bounding box intersects `rect`, ascending
    pub fn candidates(&self, rect: Rect<f64>) -> Vec<usize> {
        let query_envelope =
            AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);

        let mut slots: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&query_envelope)
            .map(|ir| ir.slot)
            .collect();
        slots.sort_unstable();
        slots
    }

    /// Slots whose bounding box contains the point, ascending
    pub fn candidates_at(&self, point: Coord<f64>) -> Vec<usize> {
        self.candidates(Rect::new(point, point))
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RegionLevel;
    use geo::{polygon, MultiPolygon};

    fn square(id: &str, x: f64, y: f64, size: f64) -> RegionPolygon {
        let p = polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ];
        RegionPolygon::new(id, RegionLevel::Fine, id, MultiPolygon::new(vec![p]))
    }

    #[test]
    fn test_empty_index() {
        let index = RegionSpatialIndex::build(&[]);
        assert!(index.is_empty());
        assert!(index.candidates_at(Coord { x: 1.0, y: 1.0 }).is_empty());
    }

    #[test]
    fn test_candidates_are_pruned_and_sorted() {
        let regions = vec![
            square("a", 0.0, 0.0, 10.0),
            square("b", 10.0, 0.0, 10.0),
            square("c", 100.0, 100.0, 10.0),
        ];
        let index = RegionSpatialIndex::build(&regions);
        assert_eq!(index.len(), 3);

        let rect = Rect::new(Coord { x: 5.0, y: 5.0 }, Coord { x: 15.0, y: 6.0 });
        assert_eq!(index.candidates(rect), vec![0, 1]);
        assert_eq!(index.candidates_at(Coord { x: 105.0, y: 105.0 }), vec![2]);
        assert!(index.candidates_at(Coord { x: 50.0, y: 50.0 }).is_empty());
    }
}
