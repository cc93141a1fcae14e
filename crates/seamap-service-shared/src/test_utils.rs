//! Test utilities for microservice handler testing.
//!
//! Fixture datasets are written into a fresh temporary directory per call,
//! so every test owns an isolated catalog and isolated caches.

use std::sync::Arc;
use std::time::Duration;

use seamap_lib::fixtures::{write_archipelago, write_sample_dataset};
use seamap_lib::{Catalog, CatalogConfig};
use tempfile::TempDir;

use crate::config::DEFAULT_LOAD_TIMEOUT;
use crate::state::AppState;

/// Display names registered by [`sample_state`], in discovery order.
pub mod fixture_layers {
    /// One polygon stored in SWEREF99 TM.
    pub const ARCHIPELAGO: &str = "Archipelago";

    /// Reserves in ETRS89 / UTM 34N, one repaired and one dropped feature.
    pub const MARINE_PROTECTED_AREAS: &str = "Baltic Sites - Marine Protected Areas";

    /// WGS84 points.
    pub const MONITORING_STATIONS: &str = "Baltic Sites - Monitoring Stations";

    /// A line declared in ETRS89 LAEA.
    pub const COASTLINE: &str = "Coastline";

    /// A single polygon a few metres across.
    pub const TINY_ISLET: &str = "Tiny Islet";
}

/// Catalog configuration rooted at `dir`.
pub fn catalog_config(dir: &TempDir) -> CatalogConfig {
    CatalogConfig {
        data_dir: dir.path().to_path_buf(),
        ..CatalogConfig::default()
    }
}

/// State over the full sample dataset. Keep the directory alive for the
/// duration of the test.
pub fn sample_state() -> (TempDir, AppState) {
    let dir = new_dir();
    if let Err(e) = write_sample_dataset(dir.path()) {
        panic!("failed to write sample dataset: {}", e);
    }
    let state = state_for(catalog_config(&dir), DEFAULT_LOAD_TIMEOUT);
    (dir, state)
}

/// State over a directory holding only the archipelago layer.
pub fn archipelago_state() -> (TempDir, AppState) {
    let dir = new_dir();
    if let Err(e) = write_archipelago(dir.path()) {
        panic!("failed to write archipelago fixture: {}", e);
    }
    let state = state_for(catalog_config(&dir), DEFAULT_LOAD_TIMEOUT);
    (dir, state)
}

/// State with explicit catalog settings and load budget.
pub fn state_for(config: CatalogConfig, load_timeout: Duration) -> AppState {
    AppState::from_catalog(Arc::new(Catalog::open(&config)), load_timeout)
}

/// Generate a unique request ID for testing.
pub fn test_request_id() -> String {
    format!("test-{}", uuid::Uuid::now_v7())
}

fn new_dir() -> TempDir {
    match TempDir::new() {
        Ok(dir) => dir,
        Err(e) => panic!("failed to create fixture directory: {}", e),
    }
}
