//! Area normalization and quantile classification.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::models::{DensityMetric, DensityMetrics, RegionAggregate};

/// Densities for one aggregate; all unavailable when the area is not positive
pub fn densities(aggregate: &RegionAggregate) -> DensityMetrics {
    let area = aggregate.area;
    if !area.is_finite() || area <= 0.0 {
        return DensityMetrics::default();
    }

    DensityMetrics {
        events_per_area: Some(aggregate.event_count as f64 / area),
        severity_per_area: Some(aggregate.total_severity as f64 / area),
        length_per_area: Some(aggregate.total_length / area),
        track_area_per_area: Some(aggregate.total_track_area / area),
    }
}

/// Return copies of the aggregates with densities filled in
pub fn normalize(aggregates: &[RegionAggregate]) -> Vec<RegionAggregate> {
    aggregates
        .iter()
        .map(|a| {
            let densities = densities(a);
            if !densities.is_available() {
                warn!(
                    "Region {} has area {}; densities unavailable",
                    a.region_id, a.area
                );
            }
            RegionAggregate {
                densities,
                ..a.clone()
            }
        })
        .collect()
}

/// Value range of one non-empty class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassBreak {
    pub bin: usize,
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Quantile classification of one metric
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub metric: DensityMetric,
    pub bins: usize,
    pub breaks: Vec<ClassBreak>,

    /// Region identifier to bin index; regions without the metric are absent
    pub assignments: BTreeMap<String, usize>,
}

impl Classification {
    pub fn bin_of(&self, region_id: &str) -> Option<usize> {
        self.assignments.get(region_id).copied()
    }
}

/// Partition regions into `bins` classes of (nearly) equal population.
///
/// Regions are ranked by value, ties broken by ascending identifier; rank
/// `r` of `n` lands in bin `r * bins / n`. Input order does not matter.
pub fn classify(aggregates: &[RegionAggregate], metric: DensityMetric, bins: usize) -> Classification {
    let bins = bins.max(1);

    let mut ranked: Vec<(f64, &str)> = aggregates
        .iter()
        .filter_map(|a| Some((a.density(metric)?, a.region_id.as_str())))
        .filter(|(v, _)| v.is_finite())
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    let n = ranked.len();
    let mut assignments = BTreeMap::new();
    let mut breaks: Vec<ClassBreak> = Vec::new();

    for (rank, (value, id)) in ranked.iter().enumerate() {
        let bin = (rank * bins / n).min(bins - 1);
        assignments.insert(id.to_string(), bin);

        match breaks.last_mut() {
            Some(b) if b.bin == bin => {
                b.upper = *value;
                b.count += 1;
            }
            _ => breaks.push(ClassBreak {
                bin,
                lower: *value,
                upper: *value,
                count: 1,
            }),
        }
    }

    debug!(
        "Classified {} regions by {} into {} bins",
        n,
        metric.field_name(),
        breaks.len()
    );

    Classification {
        metric,
        bins,
        breaks,
        assignments,
    }
}

/// Return copies of the aggregates with class bins attached
pub fn apply_classifications(
    aggregates: &[RegionAggregate],
    classifications: &[Classification],
) -> Vec<RegionAggregate> {
    aggregates
        .iter()
        .map(|a| {
            let mut out = a.clone();
            out.classes = classifications
                .iter()
                .filter_map(|c| Some((c.metric, c.bin_of(&a.region_id)?)))
                .collect();
            out
        })
        .collect()
}
