use std::fs;
use std::path::Path;

use geojson::{feature::Id, GeoJson, JsonObject, JsonValue};
use tracing::{debug, warn};

use crate::crs::CrsCode;
use crate::error::Result;
use crate::model::{AttributeValue, Attributes, FeatureId};

use super::{RawFeature, RawLayer};

/// Read a GeoJSON file as a single layer.
///
/// FeatureCollections, single Features and bare Geometries are accepted.
pub(super) fn read_layer(path: &Path) -> Result<RawLayer> {
    let text = fs::read_to_string(path)?;
    let document: GeoJson = text.parse()?;

    let mut invalid = 0usize;
    let (crs, features) = match document {
        GeoJson::FeatureCollection(collection) => {
            let crs = declared_crs(collection.foreign_members.as_ref());
            let features = collection
                .features
                .into_iter()
                .map(|feature| convert_feature(feature, &mut invalid))
                .collect();
            (crs, features)
        }
        GeoJson::Feature(feature) => {
            let crs = declared_crs(feature.foreign_members.as_ref());
            (crs, vec![convert_feature(feature, &mut invalid)])
        }
        GeoJson::Geometry(geometry) => {
            let crs = declared_crs(geometry.foreign_members.as_ref());
            let mut feature = RawFeature::new(None);
            feature.geometry = convert_geometry(geometry, &mut invalid);
            (crs, vec![feature])
        }
    };

    if invalid > 0 {
        warn!(invalid, "skipped GeoJSON geometries that could not be converted");
    }
    debug!(features = features.len(), crs = ?crs, "read geojson layer");

    Ok(RawLayer { crs, features })
}

/// Legacy (2008) named CRS member: `{"type": "name", "properties": {"name": ...}}`.
fn declared_crs(members: Option<&JsonObject>) -> Option<CrsCode> {
    let crs = members?.get("crs")?.as_object()?;
    if crs.get("type").and_then(JsonValue::as_str) != Some("name") {
        return None;
    }
    let name = crs.get("properties")?.get("name")?.as_str()?;
    let parsed = CrsCode::parse(name);
    if parsed.is_none() {
        warn!(crs = name, "unrecognised GeoJSON crs member");
    }
    parsed
}

fn convert_feature(feature: geojson::Feature, invalid: &mut usize) -> RawFeature {
    let id = feature.id.and_then(|id| match id {
        Id::String(text) => Some(FeatureId::Text(text)),
        Id::Number(number) => number.as_i64().map(FeatureId::Integer),
    });
    let geometry = feature
        .geometry
        .and_then(|geometry| convert_geometry(geometry, invalid));
    let attributes = feature
        .properties
        .map(convert_properties)
        .unwrap_or_default();

    RawFeature {
        id,
        geometry,
        attributes,
    }
}

fn convert_geometry(
    geometry: geojson::Geometry,
    invalid: &mut usize,
) -> Option<geo_types::Geometry<f64>> {
    match geo_types::Geometry::<f64>::try_from(geometry) {
        Ok(geometry) => Some(geometry),
        Err(_) => {
            *invalid += 1;
            None
        }
    }
}

/// Scalars are kept as-is; nested arrays and objects become compact JSON text.
fn convert_properties(properties: JsonObject) -> Attributes {
    properties
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                JsonValue::Null => AttributeValue::Null,
                JsonValue::Bool(v) => AttributeValue::Bool(v),
                JsonValue::Number(n) => match n.as_i64() {
                    Some(v) => AttributeValue::Integer(v),
                    None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
                },
                JsonValue::String(v) => AttributeValue::Text(v),
                nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => {
                    AttributeValue::Text(nested.to_string())
                }
            };
            (key, value)
        })
        .collect()
}
