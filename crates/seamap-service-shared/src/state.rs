//! Application state for HTTP microservices.
//!
//! Handlers reach the vector [`Catalog`] and the per-request load budget
//! through [`AppState`].

use std::sync::Arc;
use std::time::Duration;

use seamap_lib::Catalog;

use crate::config::{ServiceConfig, DEFAULT_LOAD_TIMEOUT};

/// Error during application state initialization.
#[derive(Debug)]
pub enum AppStateError {
    /// The configured data directory exists but is not a directory.
    NotADirectory(String),
}

impl std::fmt::Display for AppStateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotADirectory(path) => write!(f, "vector data path is not a directory: {}", path),
        }
    }
}

impl std::error::Error for AppStateError {}

/// Shared application state for all axum handlers.
///
/// This struct is cheaply cloneable (using `Arc` internally) and should be
/// shared via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    catalog: Arc<Catalog>,
    load_timeout: Duration,
}

impl AppState {
    /// Discover every layer under the configured data directory.
    ///
    /// A missing directory is not fatal: the service starts with an empty
    /// catalog and reports not-ready until a reload finds layers.
    pub fn load(config: &ServiceConfig) -> Result<Self, AppStateError> {
        let data_dir = &config.catalog.data_dir;
        if data_dir.exists() && !data_dir.is_dir() {
            return Err(AppStateError::NotADirectory(
                data_dir.display().to_string(),
            ));
        }

        tracing::info!(data_dir = %data_dir.display(), "discovering vector layers");
        let catalog = Catalog::open(&config.catalog);
        let snapshot = catalog.snapshot();
        tracing::info!(
            layers = snapshot.len(),
            generation = snapshot.generation(),
            "vector catalog ready"
        );

        Ok(Self::from_catalog(Arc::new(catalog), config.load_timeout))
    }

    /// Create application state around an existing catalog.
    pub fn from_catalog(catalog: Arc<Catalog>, load_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                catalog,
                load_timeout,
            }),
        }
    }

    /// Access the vector catalog.
    pub fn catalog(&self) -> &Catalog {
        &self.inner.catalog
    }

    /// Owned handle to the catalog for blocking tasks.
    pub fn catalog_arc(&self) -> Arc<Catalog> {
        Arc::clone(&self.inner.catalog)
    }

    /// Budget for building one layer payload.
    pub fn load_timeout(&self) -> Duration {
        self.inner.load_timeout
    }
}

impl From<Catalog> for AppState {
    fn from(catalog: Catalog) -> Self {
        Self::from_catalog(Arc::new(catalog), DEFAULT_LOAD_TIMEOUT)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.inner.catalog.snapshot();
        f.debug_struct("AppState")
            .field("layer_count", &snapshot.len())
            .field("generation", &snapshot.generation())
            .field("load_timeout", &self.inner.load_timeout)
            .finish()
    }
}
