//! Tolerance-based vertex reduction with per-feature degeneracy guards.
//!
//! Each feature is simplified independently with Douglas-Peucker. A feature
//! whose simplified geometry would collapse (a ring below four positions, a
//! zero-area or invalid polygon, a line below two positions) is served at full
//! resolution instead, so simplification never changes the feature count.
//! Retained vertices are always a subset of the originals, which keeps every
//! simplified coordinate inside the layer's full-resolution bounds.

use std::borrow::Cow;

use geo::{Area, CoordsIter, Simplify, Validation};
use geo_types::{Geometry, GeometryCollection, LineString, MultiLineString, MultiPolygon, Polygon};

use crate::model::{Feature, FeatureSet};

/// Simplification result borrowing the unchanged parts of its source set.
#[derive(Debug)]
pub struct SimplifiedSet<'a> {
    source: &'a FeatureSet,
    geometries: Vec<Cow<'a, Geometry<f64>>>,
    tolerance: f64,
    full_resolution_fallbacks: usize,
}

impl<'a> SimplifiedSet<'a> {
    /// Features paired with the geometry to serialize for them.
    pub fn iter(&self) -> impl Iterator<Item = (&'a Feature, &Geometry<f64>)> + '_ {
        self.source
            .features
            .iter()
            .zip(self.geometries.iter().map(|g| &**g))
    }

    pub fn source(&self) -> &'a FeatureSet {
        self.source
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// Tolerance applied, in canonical degrees; zero when unsimplified.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Features kept at full resolution because simplifying would degrade them.
    pub fn full_resolution_fallbacks(&self) -> usize {
        self.full_resolution_fallbacks
    }
}

/// Stateless Douglas-Peucker engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimplificationEngine;

impl SimplificationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Simplify every feature of `set`.
    ///
    /// `None`, zero, negative and non-finite tolerances return the set unchanged.
    pub fn simplify<'a>(&self, set: &'a FeatureSet, tolerance: Option<f64>) -> SimplifiedSet<'a> {
        let tolerance = tolerance
            .filter(|t| t.is_finite() && *t > 0.0)
            .unwrap_or(0.0);

        let mut full_resolution_fallbacks = 0;
        let geometries = set
            .features
            .iter()
            .map(|feature| {
                if tolerance == 0.0 {
                    return Cow::Borrowed(&feature.geometry);
                }
                match simplify_geometry(&feature.geometry, tolerance) {
                    Some(simplified)
                        if simplified.coords_count() < feature.geometry.coords_count() =>
                    {
                        Cow::Owned(simplified)
                    }
                    Some(_) => Cow::Borrowed(&feature.geometry),
                    None => {
                        full_resolution_fallbacks += 1;
                        Cow::Borrowed(&feature.geometry)
                    }
                }
            })
            .collect();

        SimplifiedSet {
            source: set,
            geometries,
            tolerance,
            full_resolution_fallbacks,
        }
    }
}

/// Simplified geometry, or `None` when the result would be degenerate.
fn simplify_geometry(geometry: &Geometry<f64>, epsilon: f64) -> Option<Geometry<f64>> {
    match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => Some(geometry.clone()),
        Geometry::Line(_) => Some(geometry.clone()),
        Geometry::LineString(line) => simplify_line(line, epsilon).map(Geometry::LineString),
        Geometry::MultiLineString(lines) => lines
            .0
            .iter()
            .map(|line| simplify_line(line, epsilon))
            .collect::<Option<Vec<_>>>()
            .map(|lines| Geometry::MultiLineString(MultiLineString(lines))),
        Geometry::Polygon(polygon) => simplify_polygon(polygon, epsilon).map(Geometry::Polygon),
        Geometry::MultiPolygon(polygons) => {
            let simplified = polygons
                .0
                .iter()
                .map(|polygon| simplify_polygon(polygon, epsilon))
                .collect::<Option<Vec<_>>>()?;
            let simplified = MultiPolygon(simplified);
            simplified
                .is_valid()
                .then_some(Geometry::MultiPolygon(simplified))
        }
        Geometry::Rect(rect) => Some(Geometry::Rect(*rect)),
        Geometry::Triangle(triangle) => Some(Geometry::Triangle(*triangle)),
        Geometry::GeometryCollection(collection) => collection
            .0
            .iter()
            .map(|child| simplify_geometry(child, epsilon))
            .collect::<Option<Vec<_>>>()
            .map(|children| Geometry::GeometryCollection(GeometryCollection(children))),
    }
}

fn simplify_line(line: &LineString<f64>, epsilon: f64) -> Option<LineString<f64>> {
    let simplified = line.simplify(epsilon);
    (simplified.0.len() >= 2).then_some(simplified)
}

fn simplify_polygon(polygon: &Polygon<f64>, epsilon: f64) -> Option<Polygon<f64>> {
    let exterior = polygon.exterior().simplify(epsilon);
    if exterior.0.len() < 4 {
        return None;
    }

    // A hole that would collapse keeps its original ring.
    let interiors = polygon
        .interiors()
        .iter()
        .map(|ring| {
            let simplified = ring.simplify(epsilon);
            if simplified.0.len() < 4 {
                ring.clone()
            } else {
                simplified
            }
        })
        .collect();

    let simplified = Polygon::new(exterior, interiors);
    (simplified.unsigned_area() > 0.0 && simplified.is_valid()).then_some(simplified)
}
