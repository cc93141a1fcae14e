//! On-disk backing store: container discovery and raw layer reads.
//!
//! The registry only talks to [`LayerStore`]; [`FileStore`] is the production
//! implementation over a single data directory.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use geo_types::Geometry;
use tracing::{debug, warn};

use crate::crs::CrsCode;
use crate::error::{Error, Result};
use crate::model::{Attributes, ContainerKind, ContainerRef, FeatureId};

mod geojson_file;
mod gpkg;
pub mod wkb;

/// A feature as read from its container, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFeature {
    pub id: Option<FeatureId>,
    /// `None` when the row has no geometry or its blob could not be decoded.
    pub geometry: Option<Geometry<f64>>,
    pub attributes: Attributes,
}

impl RawFeature {
    pub fn new(geometry: Option<Geometry<f64>>) -> Self {
        Self {
            id: None,
            geometry,
            attributes: Attributes::new(),
        }
    }
}

/// Every feature of one layer plus the CRS its container declares.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLayer {
    pub crs: Option<CrsCode>,
    pub features: Vec<RawFeature>,
}

/// Read access to the containers backing the registry.
pub trait LayerStore: Send + Sync + fmt::Debug {
    /// Containers available for discovery, in a stable order.
    fn list_containers(&self) -> Result<Vec<ContainerRef>>;

    /// Names of the layers inside a container.
    fn list_layers(&self, container: &ContainerRef) -> Result<Vec<String>>;

    /// Read every feature of a named layer.
    fn read_layer(&self, container: &ContainerRef, layer: &str) -> Result<RawLayer>;
}

/// [`LayerStore`] over the GeoPackage and GeoJSON files of one directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn container_kind(path: &Path) -> Option<ContainerKind> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "gpkg" => Some(ContainerKind::GeoPackage),
        "geojson" | "json" => Some(ContainerKind::GeoJson),
        _ => None,
    }
}

impl LayerStore for FileStore {
    fn list_containers(&self) -> Result<Vec<ContainerRef>> {
        if !self.root.is_dir() {
            warn!(
                data_dir = %self.root.display(),
                "vector data directory does not exist; no layers will be served"
            );
            return Ok(Vec::new());
        }

        let mut containers = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(kind) = container_kind(&path) else {
                continue;
            };
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!(path = %path.display(), "skipping container with a non UTF-8 file name");
                continue;
            };
            containers.push(ContainerRef {
                file_name: file_name.to_string(),
                path,
                kind,
            });
        }
        containers.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        debug!(count = containers.len(), "listed vector containers");
        Ok(containers)
    }

    fn list_layers(&self, container: &ContainerRef) -> Result<Vec<String>> {
        match container.kind {
            ContainerKind::GeoPackage => gpkg::list_layers(&container.path),
            ContainerKind::GeoJson => Ok(vec![container.stem().to_string()]),
        }
    }

    fn read_layer(&self, container: &ContainerRef, layer: &str) -> Result<RawLayer> {
        match container.kind {
            ContainerKind::GeoPackage => gpkg::read_layer(&container.path, layer),
            ContainerKind::GeoJson if layer == container.stem() => {
                geojson_file::read_layer(&container.path)
            }
            ContainerKind::GeoJson => Err(Error::LayerNotFound {
                identifier: format!("{}/{}", container.file_name, layer),
            }),
        }
    }
}
