use std::fs;
use std::path::Path;
use std::sync::Arc;

use approx::assert_abs_diff_eq;
use seamap_lib::fixtures::{
    rectangle, write_archipelago, write_geojson, write_geopackage, write_sample_dataset,
    CountingStore, FixtureFeature, FixtureLayer, ARCHIPELAGO_BOUNDS,
};
use seamap_lib::{
    Catalog, CatalogConfig, CacheStatus, Error, GeometryKind, Result, ToleranceBucket,
};
use serde_json::Value;
use tempfile::TempDir;

fn config(dir: &Path) -> CatalogConfig {
    CatalogConfig {
        data_dir: dir.to_path_buf(),
        ..CatalogConfig::default()
    }
}

fn sample_catalog() -> (TempDir, Catalog) {
    let dir = TempDir::new().expect("temp dir");
    write_sample_dataset(dir.path()).expect("write sample dataset");
    let catalog = Catalog::open(&config(dir.path()));
    (dir, catalog)
}

fn payload(catalog: &Catalog, identifier: &str, simplify: Option<&str>) -> Result<Value> {
    let bucket = ToleranceBucket::parse(simplify)?;
    let response = catalog.layer_response(identifier, bucket, None)?;
    Ok(serde_json::from_slice(&response.responded.body)?)
}

/// Every `[x, y]` position of a GeoJSON geometry.
fn positions(geometry: &Value) -> Vec<(f64, f64)> {
    fn walk(value: &Value, out: &mut Vec<(f64, f64)>) {
        if let Some(items) = value.as_array() {
            if let (Some(x), Some(y)) = (
                items.first().and_then(Value::as_f64),
                items.get(1).and_then(Value::as_f64),
            ) {
                out.push((x, y));
            } else {
                for item in items {
                    walk(item, out);
                }
            }
        }
    }
    let mut out = Vec::new();
    walk(&geometry["coordinates"], &mut out);
    out
}

#[test]
fn archipelago_is_served_in_canonical_degrees() -> Result<()> {
    let dir = TempDir::new()?;
    write_archipelago(dir.path())?;
    let catalog = Catalog::open(&config(dir.path()));

    let listing = catalog.listing();
    assert_eq!(listing.count, 1);
    let summary = &listing.layers[0];
    assert_eq!(summary.display_name, "Archipelago");
    assert_eq!(summary.id, "archipelago.gpkg/archipelago");
    assert_eq!(summary.crs, "EPSG:4326");
    assert_eq!(summary.geometry_type, GeometryKind::Polygon);
    assert_eq!(summary.feature_count, 1);
    for (actual, expected) in summary.bounds.to_array().iter().zip(ARCHIPELAGO_BOUNDS) {
        assert_abs_diff_eq!(*actual, expected, epsilon = 1e-6);
    }

    let body = payload(&catalog, "Archipelago", None)?;
    assert_eq!(body["type"], "FeatureCollection");
    assert_eq!(body["features"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["metadata"]["crs"], "EPSG:4326");
    assert_eq!(body["metadata"]["feature_count"], 1);
    assert_eq!(body["metadata"]["geometry_type"], "Polygon");

    let properties = &body["features"][0]["properties"];
    assert_eq!(properties["name"], "Stockholm Archipelago");
    assert!(properties.get("file_path").is_none());
    Ok(())
}

#[test]
fn repeated_requests_are_byte_identical_and_read_once() -> Result<()> {
    let dir = TempDir::new()?;
    write_archipelago(dir.path())?;
    let store = Arc::new(CountingStore::new(dir.path()));
    let catalog = Catalog::with_store(store.clone(), &config(dir.path()));
    assert_eq!(store.reads(), 1, "discovery reads each layer once");

    let bucket = ToleranceBucket::parse(Some("0.001"))?;
    let first = catalog.layer_response("Archipelago", bucket, None)?;
    assert_eq!(first.cache_status, CacheStatus::Miss);
    let reads_after_first = store.reads();

    let second = catalog.layer_response("Archipelago", bucket, None)?;
    assert_eq!(second.cache_status, CacheStatus::Hit);
    assert_eq!(first.responded.body, second.responded.body);
    assert_eq!(first.responded.etag, second.responded.etag);

    let full = catalog.layer_response("Archipelago", ToleranceBucket::FULL_RESOLUTION, None)?;
    assert_eq!(full.cache_status, CacheStatus::Miss);
    assert_eq!(store.reads(), reads_after_first, "geometry is served from memory");
    Ok(())
}

#[test]
fn conditional_request_with_current_etag_is_not_modified() -> Result<()> {
    let (_dir, catalog) = sample_catalog();
    let bucket = ToleranceBucket::FULL_RESOLUTION;
    let fresh = catalog.layer_response("Archipelago", bucket, None)?;
    assert_eq!(fresh.responded.status, 200);
    assert_eq!(fresh.responded.cache_control, "public, max-age=300");

    let header = format!("\"stale\", W/{}", fresh.responded.etag);
    let revalidated = catalog.layer_response("Archipelago", bucket, Some(&header))?;
    assert!(revalidated.responded.is_not_modified());
    assert!(revalidated.responded.body.is_empty());
    assert_eq!(revalidated.responded.etag, fresh.responded.etag);

    let mismatched = catalog.layer_response("Archipelago", bucket, Some("\"other\""))?;
    assert_eq!(mismatched.responded.status, 200);
    Ok(())
}

#[test]
fn mixed_reference_systems_are_normalized() -> Result<()> {
    let (_dir, catalog) = sample_catalog();
    let snapshot = catalog.snapshot();
    let names: Vec<&str> = snapshot
        .layers()
        .iter()
        .map(|layer| layer.display_name.as_str())
        .collect();
    assert_eq!(
        names,
        [
            "Archipelago",
            "Baltic Sites - Marine Protected Areas",
            "Baltic Sites - Monitoring Stations",
            "Coastline",
            "Tiny Islet",
        ]
    );

    for layer in snapshot.layers() {
        assert_eq!(layer.crs(), "EPSG:4326");
        let body = payload(&catalog, &layer.id, None)?;
        for feature in body["features"].as_array().into_iter().flatten() {
            for (x, y) in positions(&feature["geometry"]) {
                assert!((-180.0..=180.0).contains(&x), "{} lon {x}", layer.id);
                assert!((-90.0..=90.0).contains(&y), "{} lat {y}", layer.id);
            }
        }
    }

    let coastline = catalog.resolve("Coastline")?;
    assert_eq!(coastline.source_crs.as_deref(), Some("EPSG:3035"));
    assert_eq!(coastline.geometry_type, GeometryKind::LineString);
    assert_abs_diff_eq!(coastline.bounds.min_x, 18.0, epsilon = 1e-6);
    assert_abs_diff_eq!(coastline.bounds.max_y, 59.6, epsilon = 1e-6);

    let stations = payload(&catalog, "Baltic Sites - Monitoring Stations", None)?;
    let first = positions(&stations["features"][0]["geometry"]);
    assert_eq!(first, vec![(19.5, 58.9)]);
    Ok(())
}

#[test]
fn invalid_and_empty_features_are_repaired_or_dropped() -> Result<()> {
    let (_dir, catalog) = sample_catalog();
    let layer = catalog.resolve("baltic_sites.gpkg/marine_protected_areas")?;
    assert_eq!(layer.feature_count, 3);
    assert_eq!(layer.repair.repaired, 1);
    assert_eq!(layer.repair.dropped, 1);
    assert_eq!(layer.geometry_type, GeometryKind::Polygon);

    let body = payload(&catalog, &layer.id, None)?;
    let names: Vec<&str> = body["features"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|feature| feature["properties"]["name"].as_str())
        .collect();
    assert!(names.contains(&"Overlapping Reserve"));
    assert!(!names.contains(&"Unmapped"));
    Ok(())
}

#[test]
fn simplification_keeps_every_feature_inside_the_bounds() -> Result<()> {
    let (_dir, catalog) = sample_catalog();
    for layer in catalog.snapshot().layers() {
        for simplify in ["0.0001", "0.01", "5"] {
            let body = payload(&catalog, &layer.id, Some(simplify))?;
            assert_eq!(
                body["features"].as_array().map(Vec::len),
                Some(layer.feature_count),
                "{} at {simplify}",
                layer.id
            );
            let bounds = layer.bounds;
            for feature in body["features"].as_array().into_iter().flatten() {
                for (x, y) in positions(&feature["geometry"]) {
                    assert!(x >= bounds.min_x - 1e-9 && x <= bounds.max_x + 1e-9);
                    assert!(y >= bounds.min_y - 1e-9 && y <= bounds.max_y + 1e-9);
                }
            }
        }
    }

    let islet = payload(&catalog, "Tiny Islet", Some("5"))?;
    let ring = positions(&islet["features"][0]["geometry"]);
    assert_eq!(ring.len(), 5, "degenerate result falls back to full resolution");
    Ok(())
}

#[test]
fn coarser_tolerance_reduces_vertices() -> Result<()> {
    let dir = TempDir::new()?;
    write_geojson(
        &dir.path().join("grid_cell.geojson"),
        None,
        &[FixtureFeature::new(rectangle(10.0, 50.0, 11.0, 51.0, 50))],
    )?;
    let catalog = Catalog::open(&config(dir.path()));

    let full = payload(&catalog, "Grid Cell", None)?;
    let coarse = payload(&catalog, "Grid Cell", Some("0.01"))?;
    let full_count = positions(&full["features"][0]["geometry"]).len();
    let coarse_count = positions(&coarse["features"][0]["geometry"]).len();
    assert_eq!(full_count, 201);
    assert_eq!(coarse_count, 5);
    assert_eq!(coarse["metadata"]["simplify"], 0.01);
    assert!(full["metadata"]["simplify"].is_null());
    Ok(())
}

#[test]
fn invalid_tolerances_are_rejected() {
    for raw in ["-0.1", "abc", "NaN", "inf"] {
        let err = ToleranceBucket::parse(Some(raw)).unwrap_err();
        assert!(matches!(err, Error::InvalidTolerance { .. }), "{raw}");
    }
}

#[test]
fn unknown_layer_is_not_found() {
    let (_dir, catalog) = sample_catalog();
    let err = catalog
        .layer_response("Atlantis", ToleranceBucket::FULL_RESOLUTION, None)
        .unwrap_err();
    assert!(matches!(err, Error::LayerNotFound { .. }));
}

#[test]
fn broken_containers_do_not_hide_their_siblings() -> Result<()> {
    let dir = TempDir::new()?;
    write_archipelago(dir.path())?;
    fs::write(dir.path().join("corrupt.gpkg"), b"definitely not sqlite")?;
    fs::write(dir.path().join("truncated.geojson"), b"{\"type\": \"FeatureCollection\", ")?;
    fs::write(dir.path().join("notes.txt"), b"ignored")?;
    write_geojson(
        &dir.path().join("unsupported.geojson"),
        Some("EPSG:99999"),
        &[FixtureFeature::new(rectangle(0.0, 0.0, 1.0, 1.0, 1))],
    )?;

    let catalog = Catalog::open(&config(dir.path()));
    let listing = catalog.listing();
    assert_eq!(listing.count, 1);
    assert_eq!(listing.layers[0].display_name, "Archipelago");
    Ok(())
}

#[test]
fn duplicate_display_names_resolve_by_composite_id() -> Result<()> {
    let dir = TempDir::new()?;
    write_geopackage(
        &dir.path().join("study_areas.gpkg"),
        &[FixtureLayer::new("study_areas", Some(4326))
            .feature(FixtureFeature::new(rectangle(10.0, 55.0, 11.0, 56.0, 1)))],
    )?;
    write_geojson(
        &dir.path().join("study_areas.geojson"),
        None,
        &[FixtureFeature::new(rectangle(20.0, 60.0, 21.0, 61.0, 1))],
    )?;
    let catalog = Catalog::open(&config(dir.path()));
    assert_eq!(catalog.snapshot().len(), 2);

    let by_name = catalog.resolve("Study Areas")?;
    assert_eq!(by_name.source_file, "study_areas.geojson");

    let by_id = catalog.resolve("study_areas.gpkg/study_areas")?;
    assert_eq!(by_id.source_file, "study_areas.gpkg");
    assert_abs_diff_eq!(by_id.bounds.min_x, 10.0);
    Ok(())
}

#[test]
fn oversized_payload_is_rejected_and_not_cached() -> Result<()> {
    let dir = TempDir::new()?;
    write_archipelago(dir.path())?;
    let catalog = Catalog::open(&CatalogConfig {
        response_max_bytes: 64,
        ..config(dir.path())
    });

    let err = catalog
        .layer_response("Archipelago", ToleranceBucket::FULL_RESOLUTION, None)
        .unwrap_err();
    assert!(matches!(err, Error::ResponseTooLarge { limit: 64, .. }));
    assert!(catalog.response_cache().is_empty());
    Ok(())
}

#[test]
fn reload_publishes_a_new_generation() -> Result<()> {
    let dir = TempDir::new()?;
    write_archipelago(dir.path())?;
    let catalog = Catalog::open(&config(dir.path()));
    let before = catalog.snapshot();
    assert_eq!(before.generation(), 1);

    let layer = catalog.resolve("Archipelago")?;
    catalog.features(&layer)?;
    catalog.layer_response("Archipelago", ToleranceBucket::FULL_RESOLUTION, None)?;
    assert!(catalog.geometry_cache().contains(&layer));
    assert_eq!(catalog.response_cache().len(), 1);

    write_geojson(
        &dir.path().join("new_reserve.geojson"),
        None,
        &[FixtureFeature::new(rectangle(15.0, 56.0, 15.5, 56.5, 1))],
    )?;
    let after = catalog.reload();
    assert_eq!(after.generation(), 2);
    assert_eq!(after.len(), 2);
    assert!(catalog.geometry_cache().is_empty());
    assert!(catalog.response_cache().is_empty());
    assert_eq!(catalog.resolve("New Reserve")?.generation, 2);

    // A request still holding the old layer loads it without repopulating the tier.
    let stale = catalog.features(&layer)?;
    assert_eq!(stale.len(), layer.feature_count);
    assert!(catalog.geometry_cache().is_empty());

    // The old snapshot stays intact for readers still holding it.
    assert_eq!(before.len(), 1);
    Ok(())
}

#[test]
fn concurrent_requests_share_one_payload() -> Result<()> {
    let (_dir, catalog) = sample_catalog();
    let bucket = ToleranceBucket::parse(Some("0.001"))?;

    let responses = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| catalog.layer_response("Archipelago", bucket, None)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().expect("request thread"))
            .collect::<Result<Vec<_>>>()
    })?;

    assert_eq!(catalog.response_cache().len(), 1);
    assert_eq!(catalog.geometry_cache().len(), 1);
    let first = &responses[0].responded;
    for response in &responses {
        assert_eq!(response.responded.body, first.body);
        assert_eq!(response.responded.etag, first.etag);
    }
    Ok(())
}

#[test]
fn bounds_summary_spans_every_layer() -> Result<()> {
    let (_dir, catalog) = sample_catalog();
    let summary = catalog.bounds_summary();
    assert_eq!(summary.layer_count, 5);
    let overall = summary.overall_bounds.expect("layers registered");
    for layer in catalog.snapshot().layers() {
        assert!(overall.contains(layer.bounds.min_x, layer.bounds.min_y));
        assert!(overall.contains(layer.bounds.max_x, layer.bounds.max_y));
    }

    let empty_dir = TempDir::new()?;
    let empty = Catalog::open(&config(empty_dir.path()));
    let summary = empty.bounds_summary();
    assert_eq!(summary.layer_count, 0);
    assert!(summary.overall_bounds.is_none());
    assert!(summary.center.is_none());
    Ok(())
}
