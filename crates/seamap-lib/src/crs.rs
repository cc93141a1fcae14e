//! Coordinate reference system identifiers and their PROJ definitions.
//!
//! Containers declare their CRS as EPSG codes (GeoPackage `gpkg_spatial_ref_sys`)
//! or as URNs (GeoJSON `crs` member). Both are parsed into [`CrsCode`], which
//! resolves to a PROJ.4 definition from the built-in table below.

use std::borrow::Cow;
use std::fmt;

use crate::error::{Error, Result};

/// Canonical reference system of every served layer.
pub const CANONICAL_CRS: &str = "EPSG:4326";

const CANONICAL_EPSG: u32 = 4326;

/// Declared coordinate reference system of a layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CrsCode {
    /// An EPSG registry code.
    Epsg(u32),
    /// A raw PROJ.4 definition (`+proj=...`).
    Proj(String),
}

impl CrsCode {
    /// Parse the textual CRS forms found in GeoJSON and configuration.
    ///
    /// Accepts `EPSG:3006`, `urn:ogc:def:crs:EPSG::3006`,
    /// `urn:ogc:def:crs:EPSG:6.6:3006`, the OGC CRS84 aliases and
    /// `+proj=` strings.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.starts_with("+proj=") {
            return Some(Self::Proj(value.to_string()));
        }

        let upper = value.to_ascii_uppercase();
        if upper == "CRS84" || upper.ends_with(":CRS84") {
            return Some(Self::Epsg(CANONICAL_EPSG));
        }

        let code = if let Some(rest) = upper.strip_prefix("EPSG:") {
            rest
        } else if upper.starts_with("URN:OGC:DEF:CRS:EPSG:") {
            upper.rsplit(':').next()?
        } else {
            return None;
        };

        code.parse().ok().map(Self::Epsg)
    }

    /// Whether coordinates in this system can be served without transformation.
    ///
    /// WGS84 and ETRS89 geographic coordinates differ by less than a meter and
    /// are both served as-is.
    pub fn is_canonical(&self) -> bool {
        matches!(self, Self::Epsg(4326) | Self::Epsg(4258))
    }

    /// PROJ.4 definition used to build the transformation.
    pub fn proj_definition(&self) -> Result<Cow<'_, str>> {
        match self {
            Self::Proj(definition) => Ok(Cow::Borrowed(definition.as_str())),
            Self::Epsg(code) => epsg_definition(*code).ok_or_else(|| Error::UnsupportedCrs {
                crs: self.to_string(),
            }),
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Epsg(code) => write!(f, "EPSG:{code}"),
            Self::Proj(definition) => f.write_str(definition),
        }
    }
}

const ETRS89_TOWGS84: &str = "+ellps=GRS80 +towgs84=0,0,0,0,0,0,0";

fn epsg_definition(code: u32) -> Option<Cow<'static, str>> {
    let fixed = match code {
        4326 => "+proj=longlat +datum=WGS84 +no_defs",
        4258 => "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs",
        4269 => "+proj=longlat +datum=NAD83 +no_defs",
        3857 | 900913 => {
            "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
        }
        3006 => "+proj=utm +zone=33 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
        3067 => "+proj=utm +zone=35 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
        3035 => {
            "+proj=laea +lat_0=52 +lon_0=10 +x_0=4321000 +y_0=3210000 \
             +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
        }
        3034 => {
            "+proj=lcc +lat_0=52 +lon_0=10 +lat_1=35 +lat_2=65 +x_0=4000000 +y_0=2800000 \
             +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
        }
        2154 => {
            "+proj=lcc +lat_0=46.5 +lon_0=3 +lat_1=49 +lat_2=44 +x_0=700000 +y_0=6600000 \
             +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
        }
        27700 => {
            "+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 +x_0=400000 +y_0=-100000 +ellps=airy \
             +towgs84=446.448,-125.157,542.06,0.15,0.247,0.842,-20.489 +units=m +no_defs"
        }
        3346 => {
            "+proj=tmerc +lat_0=0 +lon_0=24 +k=0.9998 +x_0=500000 +y_0=0 \
             +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
        }
        3059 => {
            "+proj=tmerc +lat_0=0 +lon_0=24 +k=0.9996 +x_0=500000 +y_0=-6000000 \
             +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
        }
        2180 => {
            "+proj=tmerc +lat_0=0 +lon_0=19 +k=0.9993 +x_0=500000 +y_0=-5300000 \
             +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
        }
        3301 => {
            "+proj=lcc +lat_0=57.5175539305556 +lon_0=24 +lat_1=59.3333333333333 +lat_2=58 \
             +x_0=500000 +y_0=6375000 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs"
        }
        // ETRS89 / UTM zones 28N-38N
        25828..=25838 => {
            return Some(Cow::Owned(format!(
                "+proj=utm +zone={} {} +units=m +no_defs",
                code - 25800,
                ETRS89_TOWGS84
            )))
        }
        // WGS 84 / UTM north
        32601..=32660 => {
            return Some(Cow::Owned(format!(
                "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
                code - 32600
            )))
        }
        // WGS 84 / UTM south
        32701..=32760 => {
            return Some(Cow::Owned(format!(
                "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
                code - 32700
            )))
        }
        _ => return None,
    };
    Some(Cow::Borrowed(fixed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_forms() {
        assert_eq!(CrsCode::parse("EPSG:3006"), Some(CrsCode::Epsg(3006)));
        assert_eq!(CrsCode::parse("epsg:4326"), Some(CrsCode::Epsg(4326)));
        assert_eq!(
            CrsCode::parse("urn:ogc:def:crs:EPSG::3035"),
            Some(CrsCode::Epsg(3035))
        );
        assert_eq!(
            CrsCode::parse("urn:ogc:def:crs:EPSG:6.6:32634"),
            Some(CrsCode::Epsg(32634))
        );
        assert_eq!(
            CrsCode::parse("urn:ogc:def:crs:OGC:1.3:CRS84"),
            Some(CrsCode::Epsg(4326))
        );
        assert!(matches!(
            CrsCode::parse("+proj=utm +zone=33 +datum=WGS84"),
            Some(CrsCode::Proj(_))
        ));
        assert_eq!(CrsCode::parse("LOCAL_CS[\"x\"]"), None);
        assert_eq!(CrsCode::parse("EPSG:abc"), None);
    }

    #[test]
    fn utm_families_resolve_to_zones() {
        let north = CrsCode::Epsg(32634).proj_definition().unwrap();
        assert!(north.contains("+zone=34"));
        assert!(!north.contains("+south"));

        let south = CrsCode::Epsg(32721).proj_definition().unwrap();
        assert!(south.contains("+zone=21"));
        assert!(south.contains("+south"));

        let etrs = CrsCode::Epsg(25833).proj_definition().unwrap();
        assert!(etrs.contains("+zone=33"));
        assert!(etrs.contains("+ellps=GRS80"));
    }

    #[test]
    fn unknown_code_is_unsupported() {
        let err = CrsCode::Epsg(99999).proj_definition().unwrap_err();
        assert!(matches!(err, Error::UnsupportedCrs { .. }));
        assert!(err.to_string().contains("EPSG:99999"));
    }

    #[test]
    fn canonical_codes() {
        assert!(CrsCode::Epsg(4326).is_canonical());
        assert!(CrsCode::Epsg(4258).is_canonical());
        assert!(!CrsCode::Epsg(3006).is_canonical());
        assert_eq!(CrsCode::Epsg(3006).to_string(), "EPSG:3006");
    }
}
