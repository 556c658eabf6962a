//! Geographic to planar equal-area reprojection.
//!
//! Transforms are pure coordinate maps: a 2-point line stays a 2-point line
//! and polygons keep their ring structure.

use std::fmt;

use geo::{Coord, MapCoords, MultiPolygon};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use serde::Deserialize;
use tracing::debug;

use crate::config::ProjectionConfig;
use crate::error::AnalysisError;

/// A coordinate reference system, by EPSG code or PROJ.4 string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CrsSpec {
    Epsg(u32),
    Proj4(String),
}

impl CrsSpec {
    /// Resolve to a PROJ.4 definition.
    ///
    /// Only the codes this analysis needs are known; anything else must be
    /// given as a PROJ.4 string.
    pub fn proj4(&self) -> Result<String, AnalysisError> {
        match self {
            CrsSpec::Epsg(code) => epsg_proj4(*code)
                .map(str::to_string)
                .ok_or_else(|| AnalysisError::Config(format!("unsupported EPSG code {}", code))),
            CrsSpec::Proj4(s) => {
                let s = s.trim();
                if let Some(code) = s
                    .strip_prefix("EPSG:")
                    .or_else(|| s.strip_prefix("epsg:"))
                {
                    let code: u32 = code
                        .parse()
                        .map_err(|_| AnalysisError::Config(format!("invalid EPSG code '{}'", s)))?;
                    return CrsSpec::Epsg(code).proj4();
                }
                if s.is_empty() {
                    return Err(AnalysisError::Config("empty CRS definition".to_string()));
                }
                Ok(s.to_string())
            }
        }
    }
}

impl fmt::Display for CrsSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrsSpec::Epsg(code) => write!(f, "EPSG:{}", code),
            CrsSpec::Proj4(s) => write!(f, "{}", s),
        }
    }
}

fn epsg_proj4(code: u32) -> Option<&'static str> {
    match code {
        4326 => Some("+proj=longlat +datum=WGS84 +no_defs +type=crs"),
        4269 => Some("+proj=longlat +datum=NAD83 +no_defs +type=crs"),
        // CONUS Albers equal-area
        5070 => Some(
            "+proj=aea +lat_0=23 +lon_0=-96 +lat_1=29.5 +lat_2=45.5 +x_0=0 +y_0=0 \
             +datum=NAD83 +units=m +no_defs +type=crs",
        ),
        // US National Atlas equal-area
        2163 | 9311 => Some(
            "+proj=laea +lat_0=45 +lon_0=-100 +x_0=0 +y_0=0 +ellps=clrk66 \
             +units=m +no_defs +type=crs",
        ),
        _ => None,
    }
}

fn is_geographic(definition: &str) -> bool {
    definition.contains("+proj=longlat") || definition.contains("+proj=latlong")
}

enum Transform {
    Identity,
    Proj {
        source: Proj,
        target: Proj,
        source_geographic: bool,
    },
}

/// Reprojects coordinates from the source CRS into the working planar CRS
pub struct Projector {
    transform: Transform,
}

impl Projector {
    /// Build from the run configuration
    pub fn new(config: &ProjectionConfig) -> Result<Self, AnalysisError> {
        let source_def = config.source.proj4()?;
        let target_def = config.target.proj4()?;

        if is_geographic(&target_def) {
            return Err(AnalysisError::Config(format!(
                "target CRS {} is geographic; a planar equal-area projection is required",
                config.target
            )));
        }

        let source = Proj::from_proj_string(&source_def).map_err(|e| {
            AnalysisError::Config(format!("failed to build source CRS {}: {}", config.source, e))
        })?;
        let target = Proj::from_proj_string(&target_def).map_err(|e| {
            AnalysisError::Config(format!("failed to build target CRS {}: {}", config.target, e))
        })?;

        debug!("Projecting {} -> {}", config.source, config.target);

        Ok(Self {
            transform: Transform::Proj {
                source,
                target,
                source_geographic: is_geographic(&source_def),
            },
        })
    }

    /// Pass coordinates through unchanged (inputs already planar)
    pub fn identity() -> Self {
        Self {
            transform: Transform::Identity,
        }
    }

    /// Project one coordinate (degrees for geographic sources)
    pub fn project(&self, x: f64, y: f64) -> Result<Coord<f64>, String> {
        if !x.is_finite() || !y.is_finite() {
            return Err(format!("non-finite coordinate ({}, {})", x, y));
        }

        match &self.transform {
            Transform::Identity => Ok(Coord { x, y }),
            Transform::Proj {
                source,
                target,
                source_geographic,
            } => {
                if *source_geographic && (!(-180.0..=180.0).contains(&x) || !(-90.0..=90.0).contains(&y)) {
                    return Err(format!("coordinate ({}, {}) outside geographic domain", x, y));
                }

                let mut point = if *source_geographic {
                    (x.to_radians(), y.to_radians(), 0.0)
                } else {
                    (x, y, 0.0)
                };
                transform(source, target, &mut point).map_err(|e| e.to_string())?;

                let (px, py) = (point.0, point.1);

                if !px.is_finite() || !py.is_finite() {
                    return Err(format!("transform of ({}, {}) is not finite", x, y));
                }
                Ok(Coord { x: px, y: py })
            }
        }
    }

    /// Project every vertex of a polygon set
    pub fn project_polygons(&self, geometry: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, String> {
        geometry.try_map_coords(|c: Coord<f64>| self.project(c.x, c.y))
    }
}
