use std::path::Path;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::{debug, warn};

use crate::crs::CrsCode;
use crate::error::{Error, Result};
use crate::model::{AttributeValue, FeatureId};

use super::wkb::decode_gpkg_geometry;
use super::{RawFeature, RawLayer};

fn open(path: &Path) -> Result<Connection> {
    let connection = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    if !table_exists(&connection, "gpkg_contents")?
        || !table_exists(&connection, "gpkg_geometry_columns")?
    {
        return Err(Error::NotAGeoPackage {
            path: path.to_path_buf(),
        });
    }
    Ok(connection)
}

/// Feature tables registered in `gpkg_contents`, sorted by name.
pub(super) fn list_layers(path: &Path) -> Result<Vec<String>> {
    let connection = open(path)?;
    let mut stmt = connection.prepare(
        "SELECT table_name FROM gpkg_contents \
         WHERE lower(data_type) = 'features' ORDER BY table_name",
    )?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut layers = Vec::new();
    for entry in rows {
        layers.push(entry?);
    }
    Ok(layers)
}

/// Read every row of a feature table.
///
/// Rows whose geometry blob cannot be decoded are kept without geometry so
/// the repair pass can count and drop them.
pub(super) fn read_layer(path: &Path, layer: &str) -> Result<RawLayer> {
    let connection = open(path)?;

    let (geometry_column, srs_id): (String, i64) = connection
        .query_row(
            "SELECT column_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?1",
            [layer],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| Error::MissingGeometryColumn {
            layer: layer.to_string(),
        })?;

    let crs = resolve_srs(&connection, srs_id)?;
    let primary_key = integer_primary_key(&connection, layer)?;

    let sql = format!("SELECT * FROM {}", quote_identifier(layer));
    let mut stmt = connection.prepare(&sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([])?;

    let mut features = Vec::new();
    let mut undecodable = 0usize;
    while let Some(row) = rows.next()? {
        let mut feature = RawFeature::new(None);
        for (index, column) in columns.iter().enumerate() {
            let value = row.get_ref(index)?;
            if column.eq_ignore_ascii_case(&geometry_column) {
                if let ValueRef::Blob(blob) = value {
                    match decode_gpkg_geometry(blob) {
                        Ok(geometry) => feature.geometry = geometry,
                        Err(_) => undecodable += 1,
                    }
                }
            } else if primary_key.as_deref() == Some(column.as_str()) {
                if let ValueRef::Integer(id) = value {
                    feature.id = Some(FeatureId::Integer(id));
                }
            } else if let Some(attribute) = attribute_value(value) {
                feature.attributes.insert(column.clone(), attribute);
            }
        }
        features.push(feature);
    }

    if undecodable > 0 {
        warn!(layer, undecodable, "skipped undecodable geometry blobs");
    }
    debug!(layer, features = features.len(), crs = ?crs, "read geopackage layer");

    Ok(RawLayer { crs, features })
}

fn attribute_value(value: ValueRef<'_>) -> Option<AttributeValue> {
    match value {
        ValueRef::Null => Some(AttributeValue::Null),
        ValueRef::Integer(v) => Some(AttributeValue::Integer(v)),
        ValueRef::Real(v) => Some(AttributeValue::Float(v)),
        ValueRef::Text(bytes) => Some(AttributeValue::Text(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        ValueRef::Blob(_) => None,
    }
}

/// Map a GeoPackage `srs_id` onto an EPSG code.
///
/// The undefined cartesian (-1) and geographic (0) systems map to `None`.
fn resolve_srs(connection: &Connection, srs_id: i64) -> Result<Option<CrsCode>> {
    if srs_id == 0 || srs_id == -1 {
        return Ok(None);
    }

    let entry: Option<(String, i64)> = connection
        .query_row(
            "SELECT organization, organization_coordsys_id \
             FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
            [srs_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match entry {
        Some((organization, code)) if organization.eq_ignore_ascii_case("EPSG") => {
            Ok(u32::try_from(code).ok().map(CrsCode::Epsg))
        }
        Some((organization, code)) => {
            warn!(srs_id, organization = %organization, code, "non-EPSG spatial reference system");
            Ok(None)
        }
        None => {
            warn!(srs_id, "srs_id missing from gpkg_spatial_ref_sys");
            Ok(None)
        }
    }
}

fn integer_primary_key(connection: &Connection, table: &str) -> Result<Option<String>> {
    let pragma = format!("PRAGMA table_info({})", quote_identifier(table));
    let mut stmt = connection.prepare(&pragma)?;
    let mut rows = stmt.query([])?;

    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        let declared: String = row.get(2)?;
        let pk: i64 = row.get(5)?;
        if pk == 1 && declared.eq_ignore_ascii_case("INTEGER") {
            return Ok(Some(name));
        }
    }
    Ok(None)
}

fn table_exists(connection: &Connection, table: &str) -> Result<bool> {
    let mut stmt = connection
        .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 LIMIT 1")?;
    let mut rows = stmt.query([table])?;
    Ok(rows.next()?.is_some())
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_identifier("areas"), "\"areas\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn plain_sqlite_file_is_not_a_geopackage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.gpkg");
        let connection = Connection::open(&path).unwrap();
        connection
            .execute_batch("CREATE TABLE things (id INTEGER PRIMARY KEY)")
            .unwrap();
        drop(connection);

        let err = list_layers(&path).unwrap_err();
        assert!(matches!(err, Error::NotAGeoPackage { .. }));
    }

    #[test]
    fn garbage_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.gpkg");
        std::fs::write(&path, b"this is not sqlite at all, just some text bytes").unwrap();
        assert!(list_layers(&path).is_err());
    }
}
