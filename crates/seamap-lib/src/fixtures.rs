//! Test fixtures: GeoPackage and GeoJSON writers, projection helpers and an
//! instrumented store.
//!
//! Fixtures are written at test time into temporary directories, so every
//! test runs against real containers without checked-in binaries.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use geo_types::{Coord, Geometry, LineString, Polygon};
use geojson::{FeatureCollection, JsonObject};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};

use crate::crs::CrsCode;
use crate::error::Result;
use crate::model::{AttributeValue, Attributes, ContainerRef};
use crate::reproject::CoordinateTransform;
use crate::store::wkb::encode;
use crate::store::{FileStore, LayerStore, RawLayer};

/// Extent of the "Archipelago" scenario in canonical degrees.
pub const ARCHIPELAGO_BOUNDS: [f64; 4] = [19.0, 59.7, 19.3, 59.9];

/// SWEREF99 TM, the projected system the archipelago is stored in.
pub const ARCHIPELAGO_EPSG: u32 = 3006;

/// One feature to write into a fixture container.
#[derive(Debug, Clone)]
pub struct FixtureFeature {
    pub geometry: Option<Geometry<f64>>,
    pub attributes: Attributes,
}

impl FixtureFeature {
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: Some(geometry.into()),
            attributes: Attributes::new(),
        }
    }

    pub fn without_geometry() -> Self {
        Self {
            geometry: None,
            attributes: Attributes::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

/// One feature table of a fixture GeoPackage.
#[derive(Debug, Clone)]
pub struct FixtureLayer {
    pub name: String,
    /// EPSG code of the stored coordinates; `None` writes the undefined SRS.
    pub epsg: Option<u32>,
    pub features: Vec<FixtureFeature>,
}

impl FixtureLayer {
    pub fn new(name: &str, epsg: Option<u32>) -> Self {
        Self {
            name: name.to_string(),
            epsg,
            features: Vec::new(),
        }
    }

    pub fn feature(mut self, feature: FixtureFeature) -> Self {
        self.features.push(feature);
        self
    }
}

const GPKG_SCHEMA: &str = "
    CREATE TABLE gpkg_spatial_ref_sys (
        srs_name TEXT NOT NULL,
        srs_id INTEGER PRIMARY KEY,
        organization TEXT NOT NULL,
        organization_coordsys_id INTEGER NOT NULL,
        definition TEXT NOT NULL,
        description TEXT
    );
    CREATE TABLE gpkg_contents (
        table_name TEXT NOT NULL PRIMARY KEY,
        data_type TEXT NOT NULL,
        identifier TEXT UNIQUE,
        description TEXT DEFAULT '',
        last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
        min_x DOUBLE, min_y DOUBLE, max_x DOUBLE, max_y DOUBLE,
        srs_id INTEGER
    );
    CREATE TABLE gpkg_geometry_columns (
        table_name TEXT NOT NULL,
        column_name TEXT NOT NULL,
        geometry_type_name TEXT NOT NULL,
        srs_id INTEGER NOT NULL,
        z TINYINT NOT NULL,
        m TINYINT NOT NULL,
        CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name)
    );
    INSERT INTO gpkg_spatial_ref_sys VALUES
        ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', NULL),
        ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', NULL);
";

fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(value: &AttributeValue) -> &'static str {
    match value {
        AttributeValue::Integer(_) | AttributeValue::Bool(_) => "INTEGER",
        AttributeValue::Float(_) => "REAL",
        AttributeValue::Null | AttributeValue::Text(_) => "TEXT",
    }
}

fn sql_value(value: Option<&AttributeValue>) -> Value {
    match value {
        None | Some(AttributeValue::Null) => Value::Null,
        Some(AttributeValue::Bool(v)) => Value::Integer(i64::from(*v)),
        Some(AttributeValue::Integer(v)) => Value::Integer(*v),
        Some(AttributeValue::Float(v)) => Value::Real(*v),
        Some(AttributeValue::Text(v)) => Value::Text(v.clone()),
    }
}

/// Write a GeoPackage with one feature table per layer.
pub fn write_geopackage(path: &Path, layers: &[FixtureLayer]) -> Result<()> {
    let connection = Connection::open(path)?;
    connection.execute_batch(GPKG_SCHEMA)?;

    for layer in layers {
        let srs_id = match layer.epsg {
            Some(code) => {
                connection.execute(
                    "INSERT OR IGNORE INTO gpkg_spatial_ref_sys VALUES (?1, ?2, 'EPSG', ?2, ?3, NULL)",
                    params![
                        format!("EPSG:{code}"),
                        i64::from(code),
                        CrsCode::Epsg(code).proj_definition()?.into_owned()
                    ],
                )?;
                i64::from(code)
            }
            None => 0,
        };

        let mut columns: Vec<(String, &'static str)> = Vec::new();
        for feature in &layer.features {
            for (key, value) in &feature.attributes {
                if !columns.iter().any(|(name, _)| name == key) {
                    columns.push((key.clone(), sql_type(value)));
                }
            }
        }

        let mut ddl = format!(
            "CREATE TABLE {} (fid INTEGER PRIMARY KEY AUTOINCREMENT, geom BLOB",
            quote(&layer.name)
        );
        for (name, kind) in &columns {
            ddl.push_str(&format!(", {} {kind}", quote(name)));
        }
        ddl.push(')');
        connection.execute_batch(&ddl)?;

        connection.execute(
            "INSERT INTO gpkg_contents (table_name, data_type, identifier, srs_id) \
             VALUES (?1, 'features', ?1, ?2)",
            params![layer.name, srs_id],
        )?;
        connection.execute(
            "INSERT INTO gpkg_geometry_columns VALUES (?1, 'geom', 'GEOMETRY', ?2, 0, 0)",
            params![layer.name, srs_id],
        )?;

        let placeholders: Vec<String> = (0..=columns.len()).map(|i| format!("?{}", i + 1)).collect();
        let mut insert_columns = vec!["geom".to_string()];
        insert_columns.extend(columns.iter().map(|(name, _)| quote(name)));
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(&layer.name),
            insert_columns.join(", "),
            placeholders.join(", ")
        );
        let mut stmt = connection.prepare(&insert)?;
        for feature in &layer.features {
            let mut values = vec![match &feature.geometry {
                Some(geometry) => Value::Blob(encode::gpkg_geometry(geometry, srs_id as i32)?),
                None => Value::Null,
            }];
            values.extend(
                columns
                    .iter()
                    .map(|(name, _)| sql_value(feature.attributes.get(name))),
            );
            stmt.execute(params_from_iter(values))?;
        }
    }
    Ok(())
}

/// Write a GeoJSON FeatureCollection, with a legacy named `crs` member when given.
pub fn write_geojson(path: &Path, crs: Option<&str>, features: &[FixtureFeature]) -> Result<()> {
    let features = features
        .iter()
        .map(|feature| -> Result<geojson::Feature> {
            let properties = match serde_json::to_value(&feature.attributes)? {
                serde_json::Value::Object(map) => map,
                _ => JsonObject::new(),
            };
            Ok(geojson::Feature {
                bbox: None,
                geometry: feature
                    .geometry
                    .as_ref()
                    .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let foreign_members = crs.map(|name| {
        let mut members = JsonObject::new();
        members.insert(
            "crs".to_string(),
            serde_json::json!({"type": "name", "properties": {"name": name}}),
        );
        members
    });

    let collection = FeatureCollection {
        bbox: None,
        features,
        foreign_members,
    };
    fs::write(path, serde_json::to_vec(&collection)?)?;
    Ok(())
}

/// Project a canonical geometry into `EPSG:<epsg>`.
pub fn project_to(geometry: &Geometry<f64>, epsg: u32) -> Result<Geometry<f64>> {
    let transform = CoordinateTransform::new(&CrsCode::Epsg(4326), &CrsCode::Epsg(epsg))?;
    let mut projected = geometry.clone();
    transform.apply_geometry(&mut projected)?;
    Ok(projected)
}

/// Axis-aligned rectangle with `steps` vertices per edge.
pub fn rectangle(min_x: f64, min_y: f64, max_x: f64, max_y: f64, steps: usize) -> Polygon<f64> {
    let steps = steps.max(1);
    let corners = [
        Coord { x: min_x, y: min_y },
        Coord { x: max_x, y: min_y },
        Coord { x: max_x, y: max_y },
        Coord { x: min_x, y: max_y },
    ];
    let mut ring = Vec::with_capacity(steps * 4 + 1);
    for (i, start) in corners.iter().enumerate() {
        let end = corners[(i + 1) % 4];
        for step in 0..steps {
            let t = step as f64 / steps as f64;
            ring.push(Coord {
                x: start.x + (end.x - start.x) * t,
                y: start.y + (end.y - start.y) * t,
            });
        }
    }
    Polygon::new(LineString::from(ring), Vec::new())
}

/// The archipelago study area in canonical degrees.
pub fn archipelago_polygon() -> Polygon<f64> {
    let [min_x, min_y, max_x, max_y] = ARCHIPELAGO_BOUNDS;
    rectangle(min_x, min_y, max_x, max_y, 8)
}

/// Write `archipelago.gpkg`: one layer, one polygon stored in SWEREF99 TM.
pub fn write_archipelago(dir: &Path) -> Result<PathBuf> {
    let path = dir.join("archipelago.gpkg");
    let geometry = project_to(&archipelago_polygon().into(), ARCHIPELAGO_EPSG)?;
    write_geopackage(
        &path,
        &[FixtureLayer::new("archipelago", Some(ARCHIPELAGO_EPSG)).feature(
            FixtureFeature::new(geometry)
                .with("name", "Stockholm Archipelago")
                .with("area_km2", 412.5)
                .with("file_path", "/srv/data/vector/archipelago.gpkg"),
        )],
    )?;
    Ok(path)
}

/// Write a mixed dataset covering every container and CRS path:
///
/// - `archipelago.gpkg` (see [`write_archipelago`])
/// - `baltic_sites.gpkg` with `marine_protected_areas` (ETRS89 / UTM 34N,
///   including an invalid self-overlapping feature and one without geometry)
///   and `monitoring_stations` (points, WGS84)
/// - `tiny_islet.geojson`: one very small polygon, no declared CRS
/// - `coastline.geojson`: a line in ETRS89 LAEA declared via a URN
pub fn write_sample_dataset(dir: &Path) -> Result<()> {
    write_archipelago(dir)?;

    let reserve_a = rectangle(20.0, 57.0, 20.4, 57.3, 4);
    let reserve_b = rectangle(21.0, 58.0, 21.5, 58.2, 4);
    let overlapping = geo_types::MultiPolygon(vec![
        rectangle(22.0, 58.5, 22.4, 58.8, 2),
        rectangle(22.2, 58.6, 22.6, 58.9, 2),
    ]);
    write_geopackage(
        &dir.join("baltic_sites.gpkg"),
        &[
            FixtureLayer::new("marine_protected_areas", Some(25834))
                .feature(
                    FixtureFeature::new(project_to(&reserve_a.into(), 25834)?)
                        .with("name", "Gotska Sandön")
                        .with("protected", true),
                )
                .feature(
                    FixtureFeature::new(project_to(&reserve_b.into(), 25834)?)
                        .with("name", "Hiiumaa Islets"),
                )
                .feature(
                    FixtureFeature::new(project_to(&overlapping.into(), 25834)?)
                        .with("name", "Overlapping Reserve"),
                )
                .feature(FixtureFeature::without_geometry().with("name", "Unmapped")),
            FixtureLayer::new("monitoring_stations", Some(4326))
                .feature(
                    FixtureFeature::new(geo_types::Point::new(19.5, 58.9))
                        .with("name", "BY15 Gotland Deep")
                        .with("depth", 249.0),
                )
                .feature(
                    FixtureFeature::new(geo_types::Point::new(18.1, 59.3))
                        .with("name", "Askö"),
                ),
        ],
    )?;

    write_geojson(
        &dir.join("tiny_islet.geojson"),
        None,
        &[FixtureFeature::new(rectangle(19.1, 59.8, 19.10001, 59.80001, 1)).with("name", "Islet")],
    )?;

    let coastline = LineString::from(vec![(18.0, 59.0), (18.5, 59.2), (19.0, 59.3), (19.5, 59.6)]);
    write_geojson(
        &dir.join("coastline.geojson"),
        Some("urn:ogc:def:crs:EPSG::3035"),
        &[FixtureFeature::new(project_to(&coastline.into(), 3035)?).with("kind", "coast")],
    )?;
    Ok(())
}

/// [`FileStore`] that counts layer reads, optionally slowing each one down.
#[derive(Debug)]
pub struct CountingStore {
    inner: FileStore,
    reads: AtomicUsize,
    read_delay: Duration,
}

impl CountingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: FileStore::new(root),
            reads: AtomicUsize::new(0),
            read_delay: Duration::ZERO,
        }
    }

    /// Sleep this long before every layer read.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Number of `read_layer` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl LayerStore for CountingStore {
    fn list_containers(&self) -> Result<Vec<ContainerRef>> {
        self.inner.list_containers()
    }

    fn list_layers(&self, container: &ContainerRef) -> Result<Vec<String>> {
        self.inner.list_layers(container)
    }

    fn read_layer(&self, container: &ContainerRef, layer: &str) -> Result<RawLayer> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        self.inner.read_layer(container, layer)
    }
}
