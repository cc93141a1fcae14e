//! In-memory tier of normalized, repaired feature sets.
//!
//! The only path from a request to the backing store. Entries are keyed by
//! layer id and generation and are never evicted. A reload retires every
//! older generation, and loads for a retired generation that finish late are
//! handed to their caller without being stored.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::model::{FeatureSet, VectorLayer};

type Key = (String, u64);

#[derive(Debug, Default)]
struct Tier {
    entries: HashMap<Key, Arc<FeatureSet>>,
    /// Generations below this are retired and never stored.
    floor: u64,
}

#[derive(Debug, Default)]
pub struct GeometryCache {
    tier: RwLock<Tier>,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached feature set of a layer, loading it with `load` on a miss.
    ///
    /// The lock is not held while loading, so concurrent misses for one layer
    /// may each load it. The first fully built set to be inserted wins and
    /// every caller receives that one.
    pub fn get_or_load<F>(&self, layer: &VectorLayer, load: F) -> Result<Arc<FeatureSet>>
    where
        F: FnOnce(&VectorLayer) -> Result<FeatureSet>,
    {
        let key = (layer.id.clone(), layer.generation);
        if let Some(set) = self.tier.read().entries.get(&key) {
            debug!(layer = %layer.id, generation = layer.generation, "geometry cache hit");
            return Ok(Arc::clone(set));
        }

        debug!(layer = %layer.id, generation = layer.generation, "geometry cache miss");
        let loaded = Arc::new(load(layer)?);
        let mut tier = self.tier.write();
        if layer.generation < tier.floor {
            debug!(layer = %layer.id, generation = layer.generation, "not caching retired generation");
            return Ok(loaded);
        }
        Ok(Arc::clone(tier.entries.entry(key).or_insert(loaded)))
    }

    /// Whether a layer's feature set is resident.
    pub fn contains(&self, layer: &VectorLayer) -> bool {
        self.tier
            .read()
            .entries
            .contains_key(&(layer.id.clone(), layer.generation))
    }

    /// Drop every generation below `current` and refuse to store them again.
    pub fn retire_before(&self, current: u64) {
        let mut tier = self.tier.write();
        tier.floor = tier.floor.max(current);
        let floor = tier.floor;
        tier.entries.retain(|(_, generation), _| *generation >= floor);
    }

    pub fn len(&self) -> usize {
        self.tier.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tier.read().entries.is_empty()
    }
}
