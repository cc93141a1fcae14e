//! Reprojection of loaded layers into the canonical geodetic system.
//!
//! Transformations run through `proj4rs`, a full PROJ.4 pipeline (inverse
//! projection, datum shift, forward projection), so projected inputs in any
//! UTM, transverse Mercator, Lambert or LAEA zone land on correct
//! longitude/latitude degrees.

use std::cell::Cell;

use geo::{CoordsIter, MapCoordsInPlace};
use geo_types::{Coord, Geometry};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use tracing::{debug, warn};

use crate::crs::{CrsCode, CANONICAL_CRS};
use crate::error::{Error, Result};
use crate::store::{RawFeature, RawLayer};

/// A prepared coordinate transformation between two reference systems.
pub struct CoordinateTransform {
    pipeline: Pipeline,
}

enum Pipeline {
    Identity,
    Proj {
        source: Box<Proj>,
        target: Box<Proj>,
        source_geographic: bool,
        target_geographic: bool,
    },
}

impl CoordinateTransform {
    /// Build a transformation from `source` to `target`.
    ///
    /// Geographic coordinates are exchanged in degrees on both ends.
    pub fn new(source: &CrsCode, target: &CrsCode) -> Result<Self> {
        if source == target || (source.is_canonical() && target.is_canonical()) {
            return Ok(Self {
                pipeline: Pipeline::Identity,
            });
        }

        let source = build_proj(source)?;
        let target = build_proj(target)?;
        Ok(Self {
            pipeline: Pipeline::Proj {
                source_geographic: source.is_latlong(),
                target_geographic: target.is_latlong(),
                source: Box::new(source),
                target: Box::new(target),
            },
        })
    }

    /// Transformation from `source` into the canonical system.
    pub fn to_canonical(source: &CrsCode) -> Result<Self> {
        Self::new(source, &canonical())
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.pipeline, Pipeline::Identity)
    }

    /// Transform a single coordinate.
    pub fn apply(&self, coord: Coord<f64>) -> Result<Coord<f64>> {
        match &self.pipeline {
            Pipeline::Identity => Ok(coord),
            Pipeline::Proj {
                source,
                target,
                source_geographic,
                target_geographic,
            } => {
                let mut point = if *source_geographic {
                    (coord.x.to_radians(), coord.y.to_radians(), 0.0)
                } else {
                    (coord.x, coord.y, 0.0)
                };
                transform(source, target, &mut point).map_err(|e| Error::Projection {
                    message: e.to_string(),
                })?;
                let (x, y) = if *target_geographic {
                    (point.0.to_degrees(), point.1.to_degrees())
                } else {
                    (point.0, point.1)
                };
                Ok(Coord { x, y })
            }
        }
    }

    /// Transform every coordinate of a geometry in place.
    ///
    /// On failure the first error is returned and the geometry is left
    /// partially transformed.
    pub fn apply_geometry(&self, geometry: &mut Geometry<f64>) -> Result<()> {
        if self.is_identity() {
            return Ok(());
        }
        let failure: Cell<Option<Error>> = Cell::new(None);
        let failure_ref = &failure;
        geometry.map_coords_in_place(|coord| match self.apply(coord) {
            Ok(projected) => projected,
            Err(e) => {
                let first = failure_ref.take().unwrap_or(e);
                failure_ref.set(Some(first));
                coord
            }
        });
        match failure.into_inner() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn canonical() -> CrsCode {
    CrsCode::Epsg(4326)
}

fn build_proj(crs: &CrsCode) -> Result<Proj> {
    let definition = crs.proj_definition()?;
    Proj::from_proj_string(&definition).map_err(|e| Error::Projection {
        message: format!("{crs}: {e}"),
    })
}

/// Whether every coordinate is a finite longitude/latitude pair.
pub fn within_canonical_range(geometry: &Geometry<f64>) -> bool {
    geometry.coords_iter().all(|c| {
        c.x.is_finite()
            && c.y.is_finite()
            && (-180.0..=180.0).contains(&c.x)
            && (-90.0..=90.0).contains(&c.y)
    })
}

/// Features of one layer after reprojection.
#[derive(Debug)]
pub struct NormalizedLayer {
    pub features: Vec<RawFeature>,
    /// CRS the container declared, if any.
    pub source_crs: Option<CrsCode>,
    /// Features dropped because transformation failed or left the valid range.
    pub dropped: usize,
}

/// Canonicalizes every loaded layer to `EPSG:4326`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReprojectionNormalizer;

impl ReprojectionNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Reproject a raw layer into the canonical system.
    ///
    /// An undefined source CRS is assumed canonical and logged. An unknown CRS
    /// fails the whole layer; a feature whose coordinates cannot be
    /// transformed is dropped on its own.
    pub fn normalize(&self, raw: RawLayer, layer: &str) -> Result<NormalizedLayer> {
        let transform = match &raw.crs {
            Some(crs) => {
                let transform = CoordinateTransform::to_canonical(crs)?;
                if !transform.is_identity() {
                    debug!(layer, source = %crs, target = CANONICAL_CRS, "reprojecting layer");
                }
                transform
            }
            None => {
                warn!(
                    layer,
                    assumed = CANONICAL_CRS,
                    "layer declares no coordinate reference system; assuming canonical"
                );
                CoordinateTransform {
                    pipeline: Pipeline::Identity,
                }
            }
        };

        let mut dropped = 0usize;
        let mut features = Vec::with_capacity(raw.features.len());
        for mut feature in raw.features {
            if let Some(geometry) = feature.geometry.as_mut() {
                let transformed = transform.apply_geometry(geometry);
                if transformed.is_err() || !within_canonical_range(geometry) {
                    dropped += 1;
                    continue;
                }
            }
            features.push(feature);
        }

        if dropped > 0 {
            warn!(
                layer,
                dropped, "dropped features with coordinates outside the canonical range"
            );
        }

        Ok(NormalizedLayer {
            features,
            source_crs: raw.crs,
            dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use geo_types::{point, GeometryCollection, Point};

    #[test]
    fn sweref99_round_trips_to_degrees() {
        let forward = CoordinateTransform::new(&CrsCode::Epsg(4326), &CrsCode::Epsg(3006)).unwrap();
        let projected = forward.apply(Coord { x: 19.0, y: 59.7 }).unwrap();
        // Easting east of the zone 33 meridian, northing ~6.6 million metres.
        assert!(projected.x > 500_000.0 && projected.x < 800_000.0);
        assert!(projected.y > 6_500_000.0 && projected.y < 6_700_000.0);

        let inverse = CoordinateTransform::to_canonical(&CrsCode::Epsg(3006)).unwrap();
        let back = inverse.apply(projected).unwrap();
        assert_abs_diff_eq!(back.x, 19.0, epsilon = 1e-7);
        assert_abs_diff_eq!(back.y, 59.7, epsilon = 1e-7);
    }

    #[test]
    fn utm_zone_centre_maps_to_central_meridian() {
        // 500 000 m easting lies on the central meridian of UTM zone 34 (21°E).
        let transform = CoordinateTransform::to_canonical(&CrsCode::Epsg(32634)).unwrap();
        let coord = transform
            .apply(Coord {
                x: 500_000.0,
                y: 6_650_000.0,
            })
            .unwrap();
        assert_abs_diff_eq!(coord.x, 21.0, epsilon = 1e-6);
        assert!(coord.y > 59.0 && coord.y < 60.5);
    }

    #[test]
    fn web_mercator_origin_is_null_island() {
        let transform = CoordinateTransform::to_canonical(&CrsCode::Epsg(3857)).unwrap();
        let coord = transform.apply(Coord { x: 0.0, y: 0.0 }).unwrap();
        assert_abs_diff_eq!(coord.x, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(coord.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn canonical_source_is_identity() {
        assert!(CoordinateTransform::to_canonical(&CrsCode::Epsg(4326))
            .unwrap()
            .is_identity());
        assert!(CoordinateTransform::to_canonical(&CrsCode::Epsg(4258))
            .unwrap()
            .is_identity());
    }

    #[test]
    fn undefined_crs_is_assumed_canonical() {
        let raw = RawLayer {
            crs: None,
            features: vec![RawFeature::new(Some(point!(x: 10.0, y: 55.0).into()))],
        };
        let normalized = ReprojectionNormalizer::new().normalize(raw, "test").unwrap();
        assert_eq!(normalized.features.len(), 1);
        assert_eq!(
            normalized.features[0].geometry,
            Some(Geometry::Point(Point::new(10.0, 55.0)))
        );
        assert_eq!(normalized.dropped, 0);
    }

    #[test]
    fn out_of_range_features_are_dropped_individually() {
        let raw = RawLayer {
            crs: None,
            features: vec![
                RawFeature::new(Some(point!(x: 10.0, y: 55.0).into())),
                RawFeature::new(Some(point!(x: 650_000.0, y: 6_600_000.0).into())),
            ],
        };
        let normalized = ReprojectionNormalizer::new().normalize(raw, "test").unwrap();
        assert_eq!(normalized.features.len(), 1);
        assert_eq!(normalized.dropped, 1);
    }

    #[test]
    fn projected_collection_is_transformed_in_place() {
        let forward = CoordinateTransform::new(&CrsCode::Epsg(4326), &CrsCode::Epsg(3006)).unwrap();
        let a = forward.apply(Coord { x: 19.0, y: 59.7 }).unwrap();
        let b = forward.apply(Coord { x: 19.3, y: 59.9 }).unwrap();

        let mut geometry = Geometry::GeometryCollection(GeometryCollection(vec![
            Point::from(a).into(),
            Geometry::GeometryCollection(GeometryCollection(vec![Point::from(b).into()])),
        ]));
        let inverse = CoordinateTransform::to_canonical(&CrsCode::Epsg(3006)).unwrap();
        inverse.apply_geometry(&mut geometry).unwrap();

        let coords: Vec<_> = geometry.coords_iter().collect();
        assert_eq!(coords.len(), 2);
        assert_abs_diff_eq!(coords[0].x, 19.0, epsilon = 1e-7);
        assert_abs_diff_eq!(coords[1].y, 59.9, epsilon = 1e-7);
        assert!(within_canonical_range(&geometry));
    }

    #[test]
    fn projected_layer_normalizes_to_degrees() {
        let forward = CoordinateTransform::new(&CrsCode::Epsg(4326), &CrsCode::Epsg(3006)).unwrap();
        let corner = forward.apply(Coord { x: 19.0, y: 59.7 }).unwrap();
        let raw = RawLayer {
            crs: Some(CrsCode::Epsg(3006)),
            features: vec![RawFeature::new(Some(Point::from(corner).into()))],
        };
        let normalized = ReprojectionNormalizer::new().normalize(raw, "test").unwrap();
        assert_eq!(normalized.dropped, 0);
        let Some(Geometry::Point(point)) = &normalized.features[0].geometry else {
            panic!("expected a point");
        };
        assert_abs_diff_eq!(point.x(), 19.0, epsilon = 1e-7);
        assert_abs_diff_eq!(point.y(), 59.7, epsilon = 1e-7);
    }

    #[test]
    fn unknown_crs_fails_layer() {
        let raw = RawLayer {
            crs: Some(CrsCode::Epsg(99999)),
            features: vec![],
        };
        let err = ReprojectionNormalizer::new().normalize(raw, "test").unwrap_err();
        assert!(matches!(err, Error::UnsupportedCrs { .. }));
    }
}
