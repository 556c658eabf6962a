//! Boundary features from GeoJSON.

use anyhow::{bail, Context, Result};
use geo::{Geometry, MultiPolygon};
use geojson::{Feature, GeoJson};
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use twister::config::LevelFields;
use twister::models::RawRegionRecord;

pub fn load_boundaries(path: &Path, fields: &LevelFields) -> Result<Vec<RawRegionRecord>> {
    info!("Loading boundaries from {}", path.display());
    let content = fs::read_to_string(path).context("Failed to read boundary file")?;
    let records = parse_boundaries(&content, fields)
        .with_context(|| format!("Failed to parse boundaries in {}", path.display()))?;
    info!("Read {} boundary features", records.len());
    Ok(records)
}

pub fn parse_boundaries(content: &str, fields: &LevelFields) -> Result<Vec<RawRegionRecord>> {
    let geojson: GeoJson = content.parse().context("Invalid GeoJSON")?;
    let features = match geojson {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(_) => bail!("expected a Feature or FeatureCollection"),
    };

    features
        .into_iter()
        .enumerate()
        .map(|(i, feature)| to_record(i, feature, fields))
        .collect()
}

fn to_record(i: usize, feature: Feature, fields: &LevelFields) -> Result<RawRegionRecord> {
    let Some(id) = property(&feature, &fields.id) else {
        bail!("feature {} has no '{}' property", i, fields.id);
    };
    let name = property(&feature, &fields.name).unwrap_or_else(|| id.clone());
    let parent_id = fields.parent.as_ref().and_then(|p| property(&feature, p));

    // Unusable geometry is passed on empty so the catalog records the exclusion
    let geometry = match feature.geometry {
        Some(g) => geo_types::Geometry::<f64>::try_from(g).unwrap_or_else(|e| {
            warn!("Could not convert geometry for boundary {}: {}", id, e);
            Geometry::MultiPolygon(MultiPolygon::new(vec![]))
        }),
        None => Geometry::MultiPolygon(MultiPolygon::new(vec![])),
    };

    Ok(RawRegionRecord {
        id,
        name,
        parent_id,
        geometry,
    })
}

/// Property as a string; numbers are formatted without quotes
fn property(feature: &Feature, key: &str) -> Option<String> {
    match feature.property(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
