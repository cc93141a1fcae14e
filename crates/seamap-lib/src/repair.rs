//! Topology validation and repair of normalized features.
//!
//! Invalid polygonal geometry is rebuilt through a unary union of its parts,
//! the equivalent of the classic "buffer by zero" fix. Anything that cannot be
//! repaired is dropped on its own and counted in the layer's
//! [`RepairReport`].

use geo::{unary_union, HasDimensions, Validation};
use geo_types::{Geometry, MultiPolygon, Polygon};
use tracing::{debug, warn};

use crate::model::{Feature, RepairReport};
use crate::store::RawFeature;

enum Outcome {
    Valid(Geometry<f64>),
    Repaired(Geometry<f64>),
    Dropped,
}

fn repair_geometry(geometry: Geometry<f64>) -> Outcome {
    if geometry.is_empty() {
        return Outcome::Dropped;
    }
    if geometry.is_valid() {
        return Outcome::Valid(geometry);
    }

    let polygons: Vec<Polygon<f64>> = match geometry {
        Geometry::Polygon(polygon) => vec![polygon],
        Geometry::MultiPolygon(MultiPolygon(polygons)) => polygons,
        Geometry::Rect(rect) => vec![rect.to_polygon()],
        Geometry::Triangle(triangle) => vec![triangle.to_polygon()],
        _ => return Outcome::Dropped,
    };

    let mut rebuilt = unary_union(&polygons);
    rebuilt.0.retain(|polygon| !polygon.is_empty());
    let rebuilt = match rebuilt.0.len() {
        0 => return Outcome::Dropped,
        1 => Geometry::Polygon(rebuilt.0.remove(0)),
        _ => Geometry::MultiPolygon(rebuilt),
    };

    if rebuilt.is_valid() {
        Outcome::Repaired(rebuilt)
    } else {
        Outcome::Dropped
    }
}

/// Validate every feature, repairing what can be repaired.
///
/// Features without geometry count as dropped.
pub fn repair_features(raw: Vec<RawFeature>, layer: &str) -> (Vec<Feature>, RepairReport) {
    let mut report = RepairReport::default();
    let mut features = Vec::with_capacity(raw.len());

    for feature in raw {
        let Some(geometry) = feature.geometry else {
            report.dropped += 1;
            continue;
        };
        let geometry = match repair_geometry(geometry) {
            Outcome::Valid(geometry) => geometry,
            Outcome::Repaired(geometry) => {
                report.repaired += 1;
                geometry
            }
            Outcome::Dropped => {
                report.dropped += 1;
                continue;
            }
        };
        features.push(Feature {
            id: feature.id,
            geometry,
            attributes: feature.attributes,
        });
    }

    if report.dropped > 0 {
        warn!(layer, dropped = report.dropped, "dropped features with missing or unrepairable geometry");
    }
    if report.repaired > 0 {
        debug!(layer, repaired = report.repaired, "repaired invalid geometries");
    }

    (features, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;
    use geo_types::{line_string, point, polygon, LineString};

    fn raw(geometry: Option<Geometry<f64>>) -> RawFeature {
        RawFeature::new(geometry)
    }

    #[test]
    fn valid_geometries_pass_through() {
        let square: Geometry<f64> =
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)].into();
        let (features, report) = repair_features(
            vec![raw(Some(square.clone())), raw(Some(point!(x: 3.0, y: 4.0).into()))],
            "test",
        );
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].geometry, square);
        assert_eq!(report, RepairReport::default());
    }

    #[test]
    fn overlapping_multipolygon_is_merged() {
        let a = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0)];
        let b = polygon![(x: 1.0, y: 1.0), (x: 3.0, y: 1.0), (x: 3.0, y: 3.0), (x: 1.0, y: 3.0)];
        let overlapping: Geometry<f64> = MultiPolygon(vec![a, b]).into();
        assert!(!overlapping.is_valid());

        let (features, report) = repair_features(vec![raw(Some(overlapping))], "test");
        assert_eq!(report.repaired, 1);
        assert_eq!(report.dropped, 0);
        assert_eq!(features.len(), 1);
        assert!(features[0].geometry.is_valid());
        assert!((features[0].geometry.unsigned_area() - 7.0).abs() < 1e-9);
    }

    #[test]
    fn missing_and_unrepairable_geometries_are_dropped() {
        let single_point_line: Geometry<f64> =
            Geometry::LineString(LineString::from(vec![(1.0, 1.0)]));
        let (features, report) = repair_features(
            vec![
                raw(None),
                raw(Some(single_point_line)),
                raw(Some(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)].into())),
            ],
            "test",
        );
        assert_eq!(features.len(), 1);
        assert_eq!(report.dropped, 2);
    }

    #[test]
    fn zero_area_polygon_is_dropped() {
        let sliver: Geometry<f64> =
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 0.0, y: 0.0)].into();
        let (features, report) = repair_features(vec![raw(Some(sliver))], "test");
        assert!(features.is_empty());
        assert_eq!(report.dropped, 1);
    }
}
