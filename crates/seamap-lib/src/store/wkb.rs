//! GeoPackage binary geometry decoding.
//!
//! A GeoPackage geometry blob is a small header (`GP` magic, version, flags,
//! SRS id, optional envelope) followed by ISO WKB. Decoding goes through
//! `geozero`; Z and M ordinates are discarded by its `geo-types` writer.

use geo::HasDimensions;
use geo_types::Geometry;
use geozero::wkb::GpkgWkb;
use geozero::ToGeo;

use crate::error::{Error, Result};

const GP_MAGIC: &[u8; 2] = b"GP";
const FLAG_EMPTY: u8 = 0b0001_0000;

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidGeometryBlob {
        message: message.into(),
    }
}

/// Decode a GeoPackage geometry blob.
///
/// Returns `Ok(None)` for blobs flagged empty and for empty geometries.
pub fn decode_gpkg_geometry(blob: &[u8]) -> Result<Option<Geometry<f64>>> {
    if blob.len() < 8 || &blob[0..2] != GP_MAGIC {
        return Err(invalid("missing GP header"));
    }
    if blob[3] & FLAG_EMPTY != 0 {
        return Ok(None);
    }

    let geometry = GpkgWkb(blob.to_vec())
        .to_geo()
        .map_err(|e| invalid(e.to_string()))?;
    let empty = match &geometry {
        Geometry::Point(point) => point.x().is_nan() && point.y().is_nan(),
        other => other.is_empty(),
    };
    Ok((!empty).then_some(geometry))
}

/// Encoders used by fixtures to build GeoPackages at test time.
#[cfg(any(test, feature = "test-utils"))]
pub mod encode {
    use geo_types::Geometry;
    use geozero::{CoordDimensions, ToWkb};

    use super::invalid;
    use crate::error::Result;

    /// Encode a geometry as a 2D GeoPackage blob without an envelope.
    pub fn gpkg_geometry(geometry: &Geometry<f64>, srs_id: i32) -> Result<Vec<u8>> {
        geometry
            .to_gpkg_wkb(CoordDimensions::xy(), Some(srs_id), Vec::new())
            .map_err(|e| invalid(e.to_string()))
    }

    /// GeoPackage blob with the empty flag set.
    pub fn gpkg_empty(srs_id: i32) -> Vec<u8> {
        let mut out = vec![b'G', b'P', 0, 0b0001_0001];
        out.extend_from_slice(&srs_id.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{point, polygon, Point};
    use geozero::{CoordDimensions, ToWkb};

    fn header(flags: u8) -> Vec<u8> {
        let mut blob = vec![b'G', b'P', 0, flags];
        blob.extend_from_slice(&4326i32.to_le_bytes());
        blob
    }

    #[test]
    fn decodes_encoded_polygon() {
        let square: Geometry<f64> =
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)].into();
        let blob = encode::gpkg_geometry(&square, 4326).unwrap();
        assert_eq!(decode_gpkg_geometry(&blob).unwrap(), Some(square));
    }

    #[test]
    fn skips_the_envelope() {
        let square: Geometry<f64> =
            polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)].into();
        // Little endian, envelope indicator 1 (minx, maxx, miny, maxy).
        let mut blob = header(0b0000_0011);
        for value in [0.0f64, 1.0, 0.0, 1.0] {
            blob.extend_from_slice(&value.to_le_bytes());
        }
        blob.extend_from_slice(&square.to_wkb(CoordDimensions::xy()).unwrap());
        assert_eq!(decode_gpkg_geometry(&blob).unwrap(), Some(square));
    }

    #[test]
    fn drops_z_ordinate() {
        // ISO PointZ (1001) followed by x, y, z.
        let mut blob = header(0b0000_0001);
        blob.push(1);
        blob.extend_from_slice(&1001u32.to_le_bytes());
        for value in [1.0f64, 2.0, 30.0] {
            blob.extend_from_slice(&value.to_le_bytes());
        }
        assert_eq!(
            decode_gpkg_geometry(&blob).unwrap(),
            Some(Geometry::Point(point!(x: 1.0, y: 2.0)))
        );
    }

    #[test]
    fn empty_flag_and_nan_point_are_empty() {
        assert_eq!(decode_gpkg_geometry(&encode::gpkg_empty(4326)).unwrap(), None);
        // Without the flag, an all-NaN point never yields a geometry.
        let nan_point =
            encode::gpkg_geometry(&Geometry::Point(Point::new(f64::NAN, f64::NAN)), 4326).unwrap();
        assert!(decode_gpkg_geometry(&nan_point).ok().flatten().is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode_gpkg_geometry(b"XX\0\0\0\0\0\0").is_err());
        assert!(decode_gpkg_geometry(b"GP").is_err());

        let mut truncated = header(0b0000_0001);
        truncated.extend_from_slice(&[1, 1, 0, 0]);
        let err = decode_gpkg_geometry(&truncated).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometryBlob { .. }));
    }
}
