//! Seamap library entry points.
//!
//! This crate discovers vector layers in GeoPackage and GeoJSON containers,
//! normalizes them to WGS84 longitude/latitude, repairs invalid polygons,
//! simplifies them on demand and serializes GeoJSON payloads behind an
//! ETag-aware response cache. The HTTP service only depends on the
//! [`Catalog`] exported here instead of reimplementing the pipeline.
//!
//! ```text
//! store -> reproject -> repair -> registry / geometry cache
//!       -> simplify -> serialize -> response cache
//! ```

#![deny(warnings)]

pub mod catalog;
pub mod crs;
pub mod error;
pub mod geometry_cache;
pub mod model;
pub mod registry;
pub mod repair;
pub mod reproject;
pub mod response_cache;
pub mod serialize;
pub mod simplify;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;

pub use catalog::{Catalog, CatalogConfig, LayerResponse};
pub use crs::{CrsCode, CANONICAL_CRS};
pub use error::{Error, Result};
pub use geometry_cache::GeometryCache;
pub use model::{
    AttributeValue, Attributes, Bounds, ContainerKind, ContainerRef, Feature, FeatureId,
    FeatureSet, GeometryKind, RepairReport, StyleHints, VectorLayer,
};
pub use registry::{display_name, LayerRegistry, RegistrySnapshot};
pub use reproject::{CoordinateTransform, ReprojectionNormalizer};
pub use response_cache::{
    compute_etag, etag_matches, CacheKey, CacheStatus, CachedResponse, Responded, ResponseCache,
    ToleranceBucket,
};
pub use serialize::{
    AttributeRedactor, BoundsSummary, GeoJsonSerializer, LayerListing, LayerSummary,
    GEOJSON_CONTENT_TYPE,
};
pub use simplify::{SimplificationEngine, SimplifiedSet};
pub use store::{FileStore, LayerStore, RawFeature, RawLayer};
