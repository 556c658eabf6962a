//! Region catalog: one level of administrative polygons in the working projection.
//!
//! Regions are held in ascending identifier order; that order is the
//! canonical order for every downstream output.

mod index;

use std::collections::BTreeMap;

use geo::{Geometry, MultiPolygon, Validation};
use hashbrown::HashMap;
use tracing::{info, warn};

use crate::error::{AnalysisError, ExclusionSummary};
use crate::models::{RawRegionRecord, RegionLevel, RegionPolygon};
use crate::projection::Projector;

pub use index::RegionSpatialIndex;

/// Output of loading one level
pub struct CatalogLoad {
    pub catalog: RegionCatalog,
    pub exclusions: ExclusionSummary,
}

pub struct RegionCatalog {
    level: RegionLevel,
    regions: Vec<RegionPolygon>,
    by_id: HashMap<String, usize>,
    index: RegionSpatialIndex,
}

impl RegionCatalog {
    /// Reproject, validate and index raw boundary features.
    ///
    /// Bad features are excluded with a warning; the rest load normally.
    pub fn load(level: RegionLevel, records: Vec<RawRegionRecord>, projector: &Projector) -> CatalogLoad {
        info!("Loading {} {} regions...", records.len(), level.field_name());

        let mut exclusions = ExclusionSummary::default();
        let mut accepted: BTreeMap<String, RegionPolygon> = BTreeMap::new();

        for record in records {
            let subject = format!("{} region {}", level.field_name(), record.id);

            if accepted.contains_key(&record.id) {
                exclusions.record_error(
                    subject,
                    &AnalysisError::DuplicateRegion {
                        region: record.id.clone(),
                    },
                );
                continue;
            }

            match build_region(level, record, projector) {
                Ok(region) => {
                    if !region.has_area() {
                        exclusions.record_error(
                            subject,
                            &AnalysisError::ZeroAreaRegion {
                                region: region.id.clone(),
                                area: region.area,
                            },
                        );
                    }
                    accepted.insert(region.id.clone(), region);
                }
                Err(e) => exclusions.record_error(subject, &e),
            }
        }

        let catalog = Self::from_regions(level, accepted.into_values().collect());
        info!(
            "Loaded {} {} regions ({} excluded or flagged)",
            catalog.len(),
            level.field_name(),
            exclusions.total()
        );

        CatalogLoad { catalog, exclusions }
    }

    /// Build from regions already in the working projection.
    ///
    /// Later duplicates of an identifier are dropped.
    pub fn from_regions(level: RegionLevel, regions: Vec<RegionPolygon>) -> Self {
        let mut sorted: BTreeMap<String, RegionPolygon> = BTreeMap::new();
        for region in regions {
            if sorted.contains_key(&region.id) {
                warn!("Dropping duplicate region {}", region.id);
                continue;
            }
            sorted.insert(region.id.clone(), region);
        }
        let regions: Vec<RegionPolygon> = sorted.into_values().collect();

        let by_id = regions
            .iter()
            .enumerate()
            .map(|(slot, r)| (r.id.clone(), slot))
            .collect();
        let index = RegionSpatialIndex::build(&regions);

        Self {
            level,
            regions,
            by_id,
            index,
        }
    }

    pub fn level(&self) -> RegionLevel {
        self.level
    }

    /// All regions, ascending by identifier
    pub fn regions(&self) -> &[RegionPolygon] {
        &self.regions
    }

    pub fn get(&self, id: &str) -> Option<&RegionPolygon> {
        self.by_id.get(id).map(|&slot| &self.regions[slot])
    }

    pub(crate) fn slot(&self, slot: usize) -> &RegionPolygon {
        &self.regions[slot]
    }

    /// Parent identifier of a fine region
    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.get(id).and_then(|r| r.parent_id.as_deref())
    }

    /// Fine-to-coarse mapping for every region that has a parent
    pub fn parent_lookup(&self) -> BTreeMap<&str, &str> {
        self.regions
            .iter()
            .filter_map(|r| Some((r.id.as_str(), r.parent_id.as_deref()?)))
            .collect()
    }

    pub fn index(&self) -> &RegionSpatialIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

fn build_region(
    level: RegionLevel,
    record: RawRegionRecord,
    projector: &Projector,
) -> Result<RegionPolygon, AnalysisError> {
    let invalid = |reason: &str| AnalysisError::InvalidGeometry {
        region: record.id.clone(),
        reason: reason.to_string(),
    };

    let geometry = match &record.geometry {
        Geometry::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
        Geometry::MultiPolygon(mp) => mp.clone(),
        _ => return Err(invalid("not a polygon")),
    };

    if geometry.0.is_empty() || geometry.0.iter().all(|p| p.exterior().0.is_empty()) {
        return Err(invalid("empty geometry"));
    }

    let projected = projector
        .project_polygons(&geometry)
        .map_err(|reason| AnalysisError::ProjectionFailure {
            subject: format!("region {}", record.id),
            reason,
        })?;

    if !projected.is_valid() {
        return Err(invalid("self-intersecting or malformed rings"));
    }

    let mut region = RegionPolygon::new(record.id, level, record.name, projected);
    region.parent_id = record.parent_id;
    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExclusionKind;
    use geo::{line_string, point, polygon};

    fn raw(id: &str, parent: Option<&str>, geometry: Geometry<f64>) -> RawRegionRecord {
        RawRegionRecord {
            id: id.to_string(),
            name: format!("Region {}", id),
            parent_id: parent.map(str::to_string),
            geometry,
        }
    }

    fn square(x: f64, y: f64, size: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ])
    }

    #[test]
    fn test_load_sorts_and_indexes() {
        let load = RegionCatalog::load(
            RegionLevel::Fine,
            vec![
                raw("40109", Some("40"), square(10.0, 0.0, 10.0)),
                raw("40027", Some("40"), square(0.0, 0.0, 10.0)),
            ],
            &Projector::identity(),
        );
        let catalog = load.catalog;

        assert!(load.exclusions.is_empty());
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.regions()[0].id, "40027");
        assert_eq!(catalog.get("40109").unwrap().area, 100.0);
        assert_eq!(catalog.parent_of("40027"), Some("40"));
        assert_eq!(catalog.parent_lookup().len(), 2);
        assert_eq!(catalog.index().len(), 2);
    }

    #[test]
    fn test_bad_regions_excluded_not_fatal() {
        let bowtie = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]);
        let load = RegionCatalog::load(
            RegionLevel::Coarse,
            vec![
                raw("01", None, square(0.0, 0.0, 10.0)),
                raw("02", None, bowtie),
                raw("03", None, Geometry::Point(point!(x: 1.0, y: 1.0))),
                raw("04", None, Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)])),
                raw("01", None, square(50.0, 50.0, 10.0)),
                raw("05", None, Geometry::MultiPolygon(MultiPolygon::new(vec![]))),
            ],
            &Projector::identity(),
        );

        assert_eq!(load.catalog.len(), 1);
        assert_eq!(load.catalog.get("01").unwrap().bbox().unwrap().min().x, 0.0);
        assert_eq!(load.exclusions.count(ExclusionKind::InvalidGeometry), 4);
        assert_eq!(load.exclusions.count(ExclusionKind::DuplicateRegion), 1);
    }

    #[test]
    fn test_unprojectable_region_excluded() {
        let projector = Projector::new(&crate::config::ProjectionConfig::default()).unwrap();
        let load = RegionCatalog::load(
            RegionLevel::Coarse,
            vec![
                raw("40", None, square(-98.0, 35.0, 1.0)),
                raw("99", None, square(-98.0, 95.0, 1.0)),
            ],
            &projector,
        );

        assert_eq!(load.catalog.len(), 1);
        assert_eq!(load.exclusions.count(ExclusionKind::ProjectionFailure), 1);
        // Projected area of a 1x1 degree cell near 35N is roughly 10,000 km²
        let area = load.catalog.get("40").unwrap().area;
        assert!(area > 8.0e9 && area < 1.2e10, "got {}", area);
    }

    #[test]
    fn test_from_regions_drops_duplicates() {
        let a = RegionPolygon::new("a", RegionLevel::Fine, "A", MultiPolygon::new(vec![]));
        let catalog = RegionCatalog::from_regions(RegionLevel::Fine, vec![a.clone(), a]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.index().is_empty());
    }
}
