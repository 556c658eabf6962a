//! Administrative region types for the overlay.

use geo::{Area, BoundingRect, Geometry, MultiPolygon, Rect};
use serde::{Deserialize, Serialize};

/// Administrative nesting level of a catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RegionLevel {
    /// Fine-grained regions (county-equivalent)
    Fine,
    /// Parent regions (state-equivalent)
    Coarse,
}

impl RegionLevel {
    /// Get all levels, coarse first
    pub fn all() -> &'static [RegionLevel] {
        &[RegionLevel::Coarse, RegionLevel::Fine]
    }

    /// Get the field name for this level
    pub fn field_name(&self) -> &'static str {
        match self {
            RegionLevel::Fine => "fine",
            RegionLevel::Coarse => "coarse",
        }
    }
}

/// A boundary feature as handed over by the boundary reader (source CRS).
#[derive(Debug, Clone)]
pub struct RawRegionRecord {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub geometry: Geometry<f64>,
}

/// One administrative area in the working planar projection
#[derive(Debug, Clone, PartialEq)]
pub struct RegionPolygon {
    pub id: String,
    pub level: RegionLevel,

    /// Identifier of the enclosing coarse region (fine level only)
    pub parent_id: Option<String>,

    pub name: String,
    pub geometry: MultiPolygon<f64>,

    /// Planar area, computed once at construction
    pub area: f64,
}

impl RegionPolygon {
    /// Create a region from a planar geometry and cache its area
    pub fn new(
        id: impl Into<String>,
        level: RegionLevel,
        name: impl Into<String>,
        geometry: MultiPolygon<f64>,
    ) -> Self {
        let area = geometry.unsigned_area();
        Self {
            id: id.into(),
            level,
            parent_id: None,
            name: name.into(),
            geometry,
            area,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Get the bounding box of this region
    pub fn bbox(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }

    /// Whether densities can be computed for this region
    pub fn has_area(&self) -> bool {
        self.area.is_finite() && self.area > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    #[test]
    fn test_area_is_cached() {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ];
        let region = RegionPolygon::new("01001", RegionLevel::Fine, "Autauga", MultiPolygon::new(vec![square]))
            .with_parent("01");
        assert_eq!(region.area, 100.0);
        assert!(region.has_area());
        assert_eq!(region.parent_id.as_deref(), Some("01"));
    }

    #[test]
    fn test_collinear_ring_has_no_area() {
        let sliver = polygon![
            (x: 0.0, y: 0.0),
            (x: 5.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 0.0),
        ];
        let region = RegionPolygon::new("x", RegionLevel::Coarse, "Sliver", MultiPolygon::new(vec![sliver]));
        assert_eq!(region.area, 0.0);
        assert!(!region.has_area());
    }
}
