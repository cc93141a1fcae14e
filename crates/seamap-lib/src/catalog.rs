//! The assembled pipeline: registry, geometry cache, simplification,
//! serialization and response cache behind one handle.
//!
//! A [`Catalog`] is built once at startup and shared by reference; it owns
//! every cache, so tests get a fresh, isolated pipeline per instance.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::error::Result;
use crate::geometry_cache::GeometryCache;
use crate::model::{FeatureSet, VectorLayer};
use crate::registry::{LayerRegistry, RegistrySnapshot};
use crate::response_cache::{
    CacheKey, CacheStatus, CachedResponse, Responded, ResponseCache, ToleranceBucket,
};
use crate::serialize::{
    AttributeRedactor, BoundsSummary, GeoJsonSerializer, LayerListing,
};
use crate::simplify::SimplificationEngine;
use crate::store::{FileStore, LayerStore};

/// Default directory scanned for containers.
pub const DEFAULT_DATA_DIR: &str = "data/vector";
/// Default number of cached payloads.
pub const DEFAULT_RESPONSE_CACHE_CAPACITY: usize = 32;
/// Default payload ceiling (50 MiB).
pub const DEFAULT_RESPONSE_MAX_BYTES: usize = 50 * 1024 * 1024;
/// Default `Cache-Control` max-age.
pub const DEFAULT_CACHE_MAX_AGE_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq)]
pub struct CatalogConfig {
    pub data_dir: PathBuf,
    pub response_cache_capacity: usize,
    pub response_max_bytes: usize,
    pub cache_max_age_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            response_cache_capacity: DEFAULT_RESPONSE_CACHE_CAPACITY,
            response_max_bytes: DEFAULT_RESPONSE_MAX_BYTES,
            cache_max_age_secs: DEFAULT_CACHE_MAX_AGE_SECS,
        }
    }
}

/// A layer payload after conditional-GET evaluation.
#[derive(Debug, Clone)]
pub struct LayerResponse {
    pub layer: Arc<VectorLayer>,
    pub responded: Responded,
    pub cache_status: CacheStatus,
}

#[derive(Debug)]
pub struct Catalog {
    registry: LayerRegistry,
    geometry_cache: GeometryCache,
    response_cache: ResponseCache,
    engine: SimplificationEngine,
    serializer: GeoJsonSerializer,
    reload_lock: Mutex<()>,
}

impl Catalog {
    /// Catalog over the configured data directory, discovered immediately.
    pub fn open(config: &CatalogConfig) -> Self {
        Self::with_store(Arc::new(FileStore::new(config.data_dir.clone())), config)
    }

    /// Catalog over any store, discovered immediately.
    pub fn with_store(store: Arc<dyn LayerStore>, config: &CatalogConfig) -> Self {
        let catalog = Self {
            registry: LayerRegistry::new(store),
            geometry_cache: GeometryCache::new(),
            response_cache: ResponseCache::new(
                config.response_cache_capacity,
                config.cache_max_age_secs,
            ),
            engine: SimplificationEngine::new(),
            serializer: GeoJsonSerializer::new(
                AttributeRedactor::default(),
                config.response_max_bytes,
            ),
            reload_lock: Mutex::new(()),
        };
        catalog.registry.discover();
        catalog
    }

    /// Rediscover every layer under a new generation.
    ///
    /// Resident geometry and cached payloads of earlier generations are
    /// dropped.
    pub fn reload(&self) -> Arc<RegistrySnapshot> {
        let _guard = self.reload_lock.lock();
        let snapshot = self.registry.discover();
        self.geometry_cache.retire_before(snapshot.generation());
        self.response_cache.retire_before(snapshot.generation());
        info!(
            generation = snapshot.generation(),
            layers = snapshot.len(),
            "vector catalog reloaded"
        );
        snapshot
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.registry.snapshot()
    }

    pub fn resolve(&self, identifier: &str) -> Result<Arc<VectorLayer>> {
        self.registry.resolve(identifier)
    }

    pub fn listing(&self) -> LayerListing {
        LayerListing::from(self.snapshot().as_ref())
    }

    pub fn bounds_summary(&self) -> BoundsSummary {
        BoundsSummary::from(self.snapshot().as_ref())
    }

    /// Full-resolution features of a layer, loaded at most once per generation.
    pub fn features(&self, layer: &VectorLayer) -> Result<Arc<FeatureSet>> {
        self.geometry_cache
            .get_or_load(layer, |layer| self.registry.load_features(layer))
    }

    /// Serialized payload of a layer at a tolerance bucket.
    pub fn layer_payload(
        &self,
        layer: &VectorLayer,
        tolerance: ToleranceBucket,
    ) -> Result<(CachedResponse, CacheStatus)> {
        let key = CacheKey {
            layer_id: layer.id.clone(),
            tolerance,
            generation: layer.generation,
        };
        self.response_cache.get_or_build(&key, || {
            let features = self.features(layer)?;
            let simplified = self.engine.simplify(&features, tolerance.tolerance());
            self.serializer.serialize(layer, &simplified)
        })
    }

    /// Resolve, build or fetch, and evaluate `If-None-Match` in one step.
    pub fn layer_response(
        &self,
        identifier: &str,
        tolerance: ToleranceBucket,
        if_none_match: Option<&str>,
    ) -> Result<LayerResponse> {
        let layer = self.resolve(identifier)?;
        let (payload, cache_status) = self.layer_payload(&layer, tolerance)?;
        let responded = self.response_cache.handle(if_none_match, &payload);
        Ok(LayerResponse {
            layer,
            responded,
            cache_status,
        })
    }

    pub fn geometry_cache(&self) -> &GeometryCache {
        &self.geometry_cache
    }

    pub fn response_cache(&self) -> &ResponseCache {
        &self.response_cache
    }
}
