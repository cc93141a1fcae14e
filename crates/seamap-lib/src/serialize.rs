//! Wire format: GeoJSON FeatureCollections with a `metadata` envelope, plus
//! the layer listing and bounds summaries.
//!
//! Nothing serialized here may carry a filesystem path. Layer metadata only
//! exposes bare file names, and feature attributes pass through an
//! [`AttributeRedactor`] before they are written.

use bytes::Bytes;
use geojson::feature::Id;
use geojson::{FeatureCollection, JsonObject, JsonValue};
use serde::Serialize;
use tracing::debug;

use crate::crs::CANONICAL_CRS;
use crate::error::{Error, Result};
use crate::model::{
    AttributeValue, Attributes, Bounds, FeatureId, GeometryKind, RepairReport, StyleHints,
    VectorLayer,
};
use crate::registry::RegistrySnapshot;
use crate::simplify::SimplifiedSet;

/// Media type of layer payloads.
pub const GEOJSON_CONTENT_TYPE: &str = "application/geo+json";

/// Attribute names never written to a response, compared case-insensitively.
pub const SENSITIVE_ATTRIBUTES: &[&str] = &[
    "file_path",
    "filepath",
    "path",
    "source_path",
    "full_path",
    "absolute_path",
    "abs_path",
    "data_dir",
    "data_path",
    "gpkg_path",
    "local_path",
    "filename_full",
    "config",
    "connection_string",
    "password",
    "secret",
    "token",
    "api_key",
];

/// Strips sensitive attributes before serialization.
#[derive(Debug, Clone)]
pub struct AttributeRedactor {
    denylist: Vec<String>,
}

impl Default for AttributeRedactor {
    fn default() -> Self {
        Self::new(SENSITIVE_ATTRIBUTES.iter().copied())
    }
}

impl AttributeRedactor {
    pub fn new<'a>(denylist: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            denylist: denylist
                .into_iter()
                .map(|key| key.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Whether an attribute must be withheld.
    ///
    /// Denylisted names are always withheld, and so is any text value that
    /// looks like an absolute path regardless of its name.
    pub fn is_sensitive(&self, key: &str, value: &AttributeValue) -> bool {
        let key = key.to_ascii_lowercase();
        if self.denylist.iter().any(|denied| *denied == key) {
            return true;
        }
        matches!(value, AttributeValue::Text(text) if looks_like_absolute_path(text))
    }

    pub fn redact(&self, attributes: &Attributes) -> JsonObject {
        attributes
            .iter()
            .filter(|(key, value)| !self.is_sensitive(key, value))
            .map(|(key, value)| (key.clone(), attribute_json(value)))
            .collect()
    }
}

fn looks_like_absolute_path(text: &str) -> bool {
    let text = text.trim();
    let bytes = text.as_bytes();
    let drive_letter = bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'\\' || bytes[2] == b'/');
    (text.starts_with('/') && text.len() > 1 && !text.contains(char::is_whitespace))
        || text.starts_with("\\\\")
        || text.to_ascii_lowercase().starts_with("file://")
        || drive_letter
}

fn attribute_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Null => JsonValue::Null,
        AttributeValue::Bool(v) => JsonValue::Bool(*v),
        AttributeValue::Integer(v) => JsonValue::from(*v),
        AttributeValue::Float(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        AttributeValue::Text(v) => JsonValue::String(v.clone()),
    }
}

/// The `metadata` member of a layer payload.
#[derive(Debug, Serialize)]
pub struct LayerMetadata<'a> {
    pub id: &'a str,
    pub display_name: &'a str,
    pub layer_name: &'a str,
    pub source_file: &'a str,
    pub geometry_type: GeometryKind,
    pub feature_count: usize,
    /// Full-resolution bounds, whatever tolerance the payload used.
    pub bounds: Bounds,
    pub crs: &'static str,
    pub style: &'a StyleHints,
    /// Tolerance applied to the payload, or `null` at full resolution.
    pub simplify: Option<f64>,
}

/// Builds layer payloads and enforces the payload ceiling.
#[derive(Debug, Clone)]
pub struct GeoJsonSerializer {
    redactor: AttributeRedactor,
    max_bytes: usize,
}

impl GeoJsonSerializer {
    pub fn new(redactor: AttributeRedactor, max_bytes: usize) -> Self {
        Self {
            redactor,
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Serialize a (possibly simplified) feature set of `layer`.
    ///
    /// Attribute maps are ordered, so equal inputs always yield identical bytes.
    pub fn serialize(&self, layer: &VectorLayer, set: &SimplifiedSet<'_>) -> Result<Bytes> {
        let features = set
            .iter()
            .map(|(feature, geometry)| geojson::Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(geometry))),
                id: feature.id.as_ref().map(|id| match id {
                    FeatureId::Integer(v) => Id::Number((*v).into()),
                    FeatureId::Text(v) => Id::String(v.clone()),
                }),
                properties: Some(self.redactor.redact(&feature.attributes)),
                foreign_members: None,
            })
            .collect();

        let source = set.source();
        let metadata = LayerMetadata {
            id: &layer.id,
            display_name: &layer.display_name,
            layer_name: &layer.layer_name,
            source_file: &layer.source_file,
            geometry_type: source.geometry_type.unwrap_or(layer.geometry_type),
            feature_count: set.len(),
            bounds: source.bounds.unwrap_or(layer.bounds),
            crs: CANONICAL_CRS,
            style: &layer.style,
            simplify: (set.tolerance() > 0.0).then_some(set.tolerance()),
        };

        let mut foreign_members = JsonObject::new();
        foreign_members.insert("metadata".to_string(), serde_json::to_value(&metadata)?);

        let collection = FeatureCollection {
            bbox: None,
            features,
            foreign_members: Some(foreign_members),
        };

        let body = serde_json::to_vec(&collection)?;
        if body.len() > self.max_bytes {
            return Err(Error::ResponseTooLarge {
                layer: layer.display_name.clone(),
                size: body.len(),
                limit: self.max_bytes,
            });
        }

        debug!(
            layer = %layer.id,
            bytes = body.len(),
            features = set.len(),
            fallbacks = set.full_resolution_fallbacks(),
            "serialized layer payload"
        );
        Ok(Bytes::from(body))
    }
}

/// One entry of the layer listing.
#[derive(Debug, Clone, Serialize)]
pub struct LayerSummary {
    pub id: String,
    pub display_name: String,
    pub layer_name: String,
    pub geometry_type: GeometryKind,
    pub feature_count: usize,
    pub bounds: Bounds,
    pub crs: &'static str,
    pub source_file: String,
    pub style: StyleHints,
    pub generation: u64,
    pub repair: RepairReport,
}

impl From<&VectorLayer> for LayerSummary {
    fn from(layer: &VectorLayer) -> Self {
        Self {
            id: layer.id.clone(),
            display_name: layer.display_name.clone(),
            layer_name: layer.layer_name.clone(),
            geometry_type: layer.geometry_type,
            feature_count: layer.feature_count,
            bounds: layer.bounds,
            crs: layer.crs(),
            source_file: layer.source_file.clone(),
            style: layer.style.clone(),
            generation: layer.generation,
            repair: layer.repair,
        }
    }
}

/// Body of the layer listing.
#[derive(Debug, Clone, Serialize)]
pub struct LayerListing {
    pub count: usize,
    pub layers: Vec<LayerSummary>,
}

impl From<&RegistrySnapshot> for LayerListing {
    fn from(snapshot: &RegistrySnapshot) -> Self {
        let layers: Vec<LayerSummary> = snapshot
            .layers()
            .iter()
            .map(|layer| LayerSummary::from(layer.as_ref()))
            .collect();
        Self {
            count: layers.len(),
            layers,
        }
    }
}

/// Union bounds across every registered layer.
#[derive(Debug, Clone, Serialize)]
pub struct BoundsSummary {
    pub overall_bounds: Option<Bounds>,
    pub center: Option<[f64; 2]>,
    pub layer_count: usize,
}

impl From<&RegistrySnapshot> for BoundsSummary {
    fn from(snapshot: &RegistrySnapshot) -> Self {
        let overall_bounds = snapshot.overall_bounds();
        Self {
            overall_bounds,
            center: overall_bounds.map(|b| b.center()),
            layer_count: snapshot.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use geo_types::polygon;
    use serde_json::Value;

    use crate::model::{ContainerKind, ContainerRef, Feature, FeatureSet};
    use crate::simplify::SimplificationEngine;

    fn layer() -> VectorLayer {
        VectorLayer {
            id: "archipelago.gpkg/archipelago".to_string(),
            display_name: "Archipelago".to_string(),
            layer_name: "archipelago".to_string(),
            source_file: "archipelago.gpkg".to_string(),
            geometry_type: GeometryKind::Polygon,
            feature_count: 1,
            bounds: Bounds::new(19.0, 59.7, 19.3, 59.9),
            source_crs: Some("EPSG:3006".to_string()),
            style: StyleHints::for_kind(GeometryKind::Polygon),
            generation: 1,
            repair: RepairReport::default(),
            container: ContainerRef {
                path: PathBuf::from("/srv/private/data/archipelago.gpkg"),
                file_name: "archipelago.gpkg".to_string(),
                kind: ContainerKind::GeoPackage,
            },
        }
    }

    fn feature_set() -> FeatureSet {
        let mut attributes = Attributes::new();
        attributes.insert("name".to_string(), "Stockholm Archipelago".into());
        attributes.insert("file_path".to_string(), "/srv/private/data/x.gpkg".into());
        attributes.insert("origin".to_string(), "C:\\data\\archipelago.shp".into());
        attributes.insert("area_km2".to_string(), 412.5.into());
        FeatureSet::new(
            vec![Feature {
                id: Some(FeatureId::Integer(1)),
                geometry: polygon![
                    (x: 19.0, y: 59.7), (x: 19.3, y: 59.7), (x: 19.3, y: 59.9), (x: 19.0, y: 59.9)
                ]
                .into(),
                attributes,
            }],
            RepairReport::default(),
        )
    }

    #[test]
    fn payload_has_metadata_and_no_paths() {
        let set = feature_set();
        let simplified = SimplificationEngine::new().simplify(&set, None);
        let serializer = GeoJsonSerializer::new(AttributeRedactor::default(), 1 << 20);
        let body = serializer.serialize(&layer(), &simplified).unwrap();

        let text = std::str::from_utf8(&body).unwrap();
        assert!(!text.contains("/srv/private"));
        assert!(!text.contains("archipelago.shp"));

        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["features"].as_array().unwrap().len(), 1);
        assert_eq!(json["features"][0]["properties"]["name"], "Stockholm Archipelago");
        assert!(json["features"][0]["properties"].get("file_path").is_none());
        assert_eq!(json["metadata"]["feature_count"], 1);
        assert_eq!(json["metadata"]["crs"], "EPSG:4326");
        assert_eq!(json["metadata"]["source_file"], "archipelago.gpkg");
        assert_eq!(json["metadata"]["bounds"][2], 19.3);
        assert!(json["metadata"]["simplify"].is_null());
        assert_eq!(json["metadata"]["style"]["fillOpacity"], 0.4);
    }

    #[test]
    fn identical_input_gives_identical_bytes() {
        let set = feature_set();
        let serializer = GeoJsonSerializer::new(AttributeRedactor::default(), 1 << 20);
        let engine = SimplificationEngine::new();
        let a = serializer
            .serialize(&layer(), &engine.simplify(&set, Some(0.001)))
            .unwrap();
        let b = serializer
            .serialize(&layer(), &engine.simplify(&set, Some(0.001)))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let set = feature_set();
        let simplified = SimplificationEngine::new().simplify(&set, None);
        let serializer = GeoJsonSerializer::new(AttributeRedactor::default(), 64);
        let err = serializer.serialize(&layer(), &simplified).unwrap_err();
        assert!(matches!(err, Error::ResponseTooLarge { limit: 64, .. }));
    }

    #[test]
    fn redactor_matches_keys_case_insensitively() {
        let redactor = AttributeRedactor::default();
        let text = AttributeValue::from("ok");
        assert!(redactor.is_sensitive("File_Path", &text));
        assert!(redactor.is_sensitive("notes", &AttributeValue::from("\\\\server\\share")));
        assert!(redactor.is_sensitive("notes", &AttributeValue::from("file:///tmp/x")));
        assert!(!redactor.is_sensitive("notes", &AttributeValue::from("a / b ratio")));
        assert!(!redactor.is_sensitive("name", &text));
    }
}
