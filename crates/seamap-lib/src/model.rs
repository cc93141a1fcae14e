//! Typed layer, feature and metadata model.
//!
//! Every loaded layer is described by a [`VectorLayer`] and its geometry by a
//! [`FeatureSet`] in the canonical CRS. Geometry kinds form a closed set so
//! downstream code never dispatches on strings.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use geo::BoundingRect;
use geo_types::{Geometry, Rect};
use serde::{Serialize, Serializer};

use crate::crs::CANONICAL_CRS;

/// Closed set of geometry kinds a layer can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryKind {
    /// Kind of a single geometry value.
    pub fn of(geometry: &Geometry<f64>) -> Self {
        match geometry {
            Geometry::Point(_) => Self::Point,
            Geometry::MultiPoint(_) => Self::MultiPoint,
            Geometry::Line(_) | Geometry::LineString(_) => Self::LineString,
            Geometry::MultiLineString(_) => Self::MultiLineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => Self::Polygon,
            Geometry::MultiPolygon(_) => Self::MultiPolygon,
            Geometry::GeometryCollection(_) => Self::GeometryCollection,
        }
    }

    /// Summarize the kinds of all features of a layer.
    ///
    /// A uniform layer reports its kind. Single and multi variants of the same
    /// family collapse to the multi variant; anything else is a collection.
    /// Returns `None` for an empty iterator.
    pub fn combine(kinds: impl IntoIterator<Item = Self>) -> Option<Self> {
        kinds.into_iter().fold(None, |acc, kind| match acc {
            None => Some(kind),
            Some(current) if current == kind => Some(current),
            Some(current) => match (current.family(), kind.family()) {
                (Some(a), Some(b)) if a == b => Some(a),
                _ => Some(Self::GeometryCollection),
            },
        })
    }

    fn family(self) -> Option<Self> {
        match self {
            Self::Point | Self::MultiPoint => Some(Self::MultiPoint),
            Self::LineString | Self::MultiLineString => Some(Self::MultiLineString),
            Self::Polygon | Self::MultiPolygon => Some(Self::MultiPolygon),
            Self::GeometryCollection => None,
        }
    }

    /// Whether features of this kind are expected to enclose an area.
    pub fn is_areal(self) -> bool {
        matches!(self, Self::Polygon | Self::MultiPolygon)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Point => "Point",
            Self::MultiPoint => "MultiPoint",
            Self::LineString => "LineString",
            Self::MultiLineString => "MultiLineString",
            Self::Polygon => "Polygon",
            Self::MultiPolygon => "MultiPolygon",
            Self::GeometryCollection => "GeometryCollection",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned bounding box, serialized as `[min_x, min_y, max_x, max_y]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Tight bounds of a sequence of geometries, or `None` when none has extent.
    pub fn of_geometries<'a>(geometries: impl IntoIterator<Item = &'a Geometry<f64>>) -> Option<Self> {
        geometries
            .into_iter()
            .filter_map(|geometry| geometry.bounding_rect())
            .map(Self::from)
            .reduce(|a, b| a.union(&b))
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.min_x <= x && x <= self.max_x && self.min_y <= y && y <= self.max_y
    }

    pub fn center(&self) -> [f64; 2] {
        [
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        ]
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.min_x, self.min_y, self.max_x, self.max_y]
    }
}

impl From<Rect<f64>> for Bounds {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

impl Serialize for Bounds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_array().serialize(serializer)
    }
}

/// Scalar attribute value read from a backing container.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Attribute mapping of a feature; keys are unique and kept in sorted order.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Identifier of a feature inside its layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureId {
    Integer(i64),
    Text(String),
}

/// A feature with geometry already in the canonical CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<FeatureId>,
    pub geometry: Geometry<f64>,
    pub attributes: Attributes,
}

/// Counts of geometries touched by topology repair while loading a layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Features whose geometry was invalid and rebuilt.
    pub repaired: usize,
    /// Features dropped because their geometry was missing or unrepairable.
    pub dropped: usize,
}

impl RepairReport {
    pub fn merge(&mut self, other: RepairReport) {
        self.repaired += other.repaired;
        self.dropped += other.dropped;
    }
}

/// Normalized, repaired features of one layer at full resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub features: Vec<Feature>,
    pub bounds: Option<Bounds>,
    pub geometry_type: Option<GeometryKind>,
    pub repair: RepairReport,
}

impl FeatureSet {
    /// Build a set and compute its full-resolution bounds and geometry kind.
    pub fn new(features: Vec<Feature>, repair: RepairReport) -> Self {
        let bounds = Bounds::of_geometries(features.iter().map(|f| &f.geometry));
        let geometry_type = GeometryKind::combine(features.iter().map(|f| GeometryKind::of(&f.geometry)));
        Self {
            features,
            bounds,
            geometry_type,
            repair,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Render hints passed through to the map client untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill_opacity: Option<f64>,
    pub opacity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
}

impl StyleHints {
    /// Default styling for a geometry kind.
    pub fn for_kind(kind: GeometryKind) -> Self {
        match kind {
            GeometryKind::LineString | GeometryKind::MultiLineString => Self {
                fill_color: None,
                color: "#40E0D0".to_string(),
                weight: Some(3.0),
                fill_opacity: None,
                opacity: 0.8,
                radius: None,
            },
            GeometryKind::Point | GeometryKind::MultiPoint => Self {
                fill_color: Some("#20B2AA".to_string()),
                color: "#48D1CC".to_string(),
                weight: None,
                fill_opacity: Some(0.8),
                opacity: 1.0,
                radius: Some(6.0),
            },
            GeometryKind::Polygon | GeometryKind::MultiPolygon | GeometryKind::GeometryCollection => {
                Self {
                    fill_color: Some("#20B2AA".to_string()),
                    color: "#008B8B".to_string(),
                    weight: Some(2.0),
                    fill_opacity: Some(0.4),
                    opacity: 0.8,
                    radius: None,
                }
            }
        }
    }
}

/// Supported on-disk container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// Multi-layer SQLite GeoPackage.
    GeoPackage,
    /// Single-layer GeoJSON document.
    GeoJson,
}

/// A backing file discovered in the data directory.
///
/// The path is internal; only `file_name` ever reaches a response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerRef {
    pub path: PathBuf,
    pub file_name: String,
    pub kind: ContainerKind,
}

impl ContainerRef {
    /// File name without its extension.
    pub fn stem(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.file_name)
    }
}

/// Registry entry for one servable layer.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorLayer {
    /// Composite `source_file/layer_name` identifier, unique across the registry.
    pub id: String,
    pub display_name: String,
    pub layer_name: String,
    pub source_file: String,
    pub geometry_type: GeometryKind,
    pub feature_count: usize,
    /// Full-resolution bounds in the canonical CRS.
    pub bounds: Bounds,
    /// CRS declared by the backing container, if any.
    pub source_crs: Option<String>,
    pub style: StyleHints,
    pub generation: u64,
    pub repair: RepairReport,
    pub container: ContainerRef,
}

impl VectorLayer {
    /// Reference CRS of the served geometry; always the canonical system.
    pub fn crs(&self) -> &'static str {
        CANONICAL_CRS
    }
}
