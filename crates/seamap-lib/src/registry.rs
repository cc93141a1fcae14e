//! Layer discovery, metadata and identifier resolution.
//!
//! Discovery walks every container of the [`LayerStore`], loads each layer
//! once to compute its full-resolution metadata, and publishes the result as
//! an immutable [`RegistrySnapshot`]. Failures are isolated per container and
//! per layer: a broken file never prevents its siblings from being served.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::crs::CrsCode;
use crate::error::{Error, Result};
use crate::model::{Bounds, ContainerRef, FeatureSet, StyleHints, VectorLayer};
use crate::repair::repair_features;
use crate::reproject::ReprojectionNormalizer;
use crate::store::LayerStore;

/// Immutable view of the registered layers for one generation.
#[derive(Debug)]
pub struct RegistrySnapshot {
    layers: Vec<Arc<VectorLayer>>,
    generation: u64,
    loaded_at: DateTime<Utc>,
}

impl RegistrySnapshot {
    fn empty() -> Self {
        Self {
            layers: Vec::new(),
            generation: 0,
            loaded_at: Utc::now(),
        }
    }

    /// Layers in discovery order (containers sorted by file name).
    pub fn layers(&self) -> &[Arc<VectorLayer>] {
        &self.layers
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Find a layer by display name, falling back to its `source_file/layer_name` id.
    ///
    /// When two layers share a display name the first in discovery order wins;
    /// the composite id always reaches either one.
    pub fn resolve(&self, identifier: &str) -> Option<&Arc<VectorLayer>> {
        self.layers
            .iter()
            .find(|layer| layer.display_name == identifier)
            .or_else(|| self.layers.iter().find(|layer| layer.id == identifier))
    }

    /// Union of every layer's full-resolution bounds.
    pub fn overall_bounds(&self) -> Option<Bounds> {
        self.layers
            .iter()
            .map(|layer| layer.bounds)
            .reduce(|a, b| a.union(&b))
    }
}

/// Registry of servable layers backed by a [`LayerStore`].
#[derive(Debug)]
pub struct LayerRegistry {
    store: Arc<dyn LayerStore>,
    normalizer: ReprojectionNormalizer,
    generation: AtomicU64,
    snapshot: RwLock<Arc<RegistrySnapshot>>,
}

impl LayerRegistry {
    /// Create an empty registry; call [`LayerRegistry::discover`] to populate it.
    pub fn new(store: Arc<dyn LayerStore>) -> Self {
        Self {
            store,
            normalizer: ReprojectionNormalizer::new(),
            generation: AtomicU64::new(0),
            snapshot: RwLock::new(Arc::new(RegistrySnapshot::empty())),
        }
    }

    /// Current snapshot. Cheap; holds the lock only to clone an `Arc`.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Scan the store and publish a new snapshot under the next generation.
    ///
    /// Never fails: unreadable containers and layers, unsupported reference
    /// systems and empty layers are logged and left out.
    pub fn discover(&self) -> Arc<RegistrySnapshot> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let containers = match self.store.list_containers() {
            Ok(containers) => containers,
            Err(e) => {
                warn!(error = %e, "failed to list vector containers");
                Vec::new()
            }
        };

        let mut layers = Vec::new();
        for container in &containers {
            let names = match self.store.list_layers(container) {
                Ok(names) => names,
                Err(e) => {
                    warn!(
                        source_file = %container.file_name,
                        error = %e,
                        "skipping unreadable container"
                    );
                    continue;
                }
            };

            for name in names {
                match self.describe(container, &name, generation) {
                    Ok(Some(layer)) => {
                        info!(
                            layer = %layer.display_name,
                            id = %layer.id,
                            geometry_type = %layer.geometry_type,
                            features = layer.feature_count,
                            repaired = layer.repair.repaired,
                            dropped = layer.repair.dropped,
                            "registered vector layer"
                        );
                        layers.push(Arc::new(layer));
                    }
                    Ok(None) => {
                        warn!(
                            source_file = %container.file_name,
                            layer = %name,
                            "layer has no usable features; excluded"
                        );
                    }
                    Err(e) => {
                        warn!(
                            source_file = %container.file_name,
                            layer = %name,
                            error = %e,
                            "failed to load layer; excluded"
                        );
                    }
                }
            }
        }

        let snapshot = Arc::new(RegistrySnapshot {
            layers,
            generation,
            loaded_at: Utc::now(),
        });
        info!(
            containers = containers.len(),
            layers = snapshot.len(),
            generation,
            "vector layer discovery complete"
        );

        *self.snapshot.write() = Arc::clone(&snapshot);
        snapshot
    }

    /// Resolve an identifier against the current snapshot.
    pub fn resolve(&self, identifier: &str) -> Result<Arc<VectorLayer>> {
        self.snapshot()
            .resolve(identifier)
            .cloned()
            .ok_or_else(|| Error::LayerNotFound {
                identifier: identifier.to_string(),
            })
    }

    /// Read, reproject and repair the features of a registered layer.
    pub fn load_features(&self, layer: &VectorLayer) -> Result<FeatureSet> {
        self.load(&layer.container, &layer.layer_name)
            .map(|(set, _)| set)
    }

    fn load(&self, container: &ContainerRef, name: &str) -> Result<(FeatureSet, Option<CrsCode>)> {
        let label = format!("{}/{}", container.file_name, name);
        let raw = self.store.read_layer(container, name)?;
        let normalized = self.normalizer.normalize(raw, &label)?;
        let (features, mut repair) = repair_features(normalized.features, &label);
        repair.dropped += normalized.dropped;
        Ok((FeatureSet::new(features, repair), normalized.source_crs))
    }

    fn describe(
        &self,
        container: &ContainerRef,
        name: &str,
        generation: u64,
    ) -> Result<Option<VectorLayer>> {
        let (set, source_crs) = self.load(container, name)?;

        let (Some(geometry_type), Some(bounds)) = (set.geometry_type, set.bounds) else {
            return Ok(None);
        };

        Ok(Some(VectorLayer {
            id: format!("{}/{}", container.file_name, name),
            display_name: display_name(container.stem(), name),
            layer_name: name.to_string(),
            source_file: container.file_name.clone(),
            geometry_type,
            feature_count: set.len(),
            bounds,
            source_crs: source_crs.map(|crs| crs.to_string()),
            style: StyleHints::for_kind(geometry_type),
            generation,
            repair: set.repair,
            container: container.clone(),
        }))
    }
}

/// Human-friendly layer name derived from the file stem and layer name.
///
/// Underscores become spaces and words are title cased. When the layer is
/// named after its file, the file part alone is used.
pub fn display_name(file_stem: &str, layer_name: &str) -> String {
    let file_display = title_case(&file_stem.replace('_', " "));
    if layer_name.eq_ignore_ascii_case(file_stem) {
        file_display
    } else {
        format!(
            "{} - {}",
            file_display,
            title_case(&layer_name.replace('_', " "))
        )
    }
}

fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_cased = false;
    for c in text.chars() {
        if previous_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_cased = c.is_alphabetic();
    }
    out
}
