use std::path::PathBuf;

use thiserror::Error;

/// Convenient result alias for the Seamap library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// No registered layer matches the identifier by display name or `source/layer` id.
    #[error("layer not found: {identifier}")]
    LayerNotFound { identifier: String },

    /// Raised when a simplification tolerance is negative or not a finite number.
    #[error("invalid simplify tolerance '{value}': expected a non-negative number")]
    InvalidTolerance { value: String },

    /// Raised when a serialized layer exceeds the configured payload ceiling.
    #[error(
        "response for layer '{layer}' is {size} bytes, above the {limit} byte limit; \
         request a coarser simplify tolerance"
    )]
    ResponseTooLarge {
        layer: String,
        size: usize,
        limit: usize,
    },

    /// Raised when a layer declares a CRS with no known PROJ definition.
    #[error("unsupported coordinate reference system {crs}")]
    UnsupportedCrs { crs: String },

    /// Raised when PROJ setup or a coordinate transformation fails.
    #[error("coordinate transformation failed: {message}")]
    Projection { message: String },

    /// Raised when a GeoPackage geometry blob or WKB payload cannot be decoded.
    #[error("invalid geometry blob: {message}")]
    InvalidGeometryBlob { message: String },

    /// Raised when a container file has an extension no reader handles.
    #[error("unsupported container format: {file_name}")]
    UnsupportedContainer { file_name: String },

    /// Raised when a `.gpkg` file lacks the GeoPackage metadata tables.
    #[error("{path} is not a GeoPackage; expected gpkg_contents and gpkg_geometry_columns tables")]
    NotAGeoPackage { path: PathBuf },

    /// Raised when a feature table is not registered in `gpkg_geometry_columns`.
    #[error("layer {layer} has no registered geometry column")]
    MissingGeometryColumn { layer: String },

    /// Wrapper for SQLite errors.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Wrapper for IO errors.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapper for JSON serialization errors.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Wrapper for GeoJSON parsing errors.
    #[error(transparent)]
    GeoJson(#[from] Box<geojson::Error>),
}

impl From<geojson::Error> for Error {
    fn from(err: geojson::Error) -> Self {
        Self::GeoJson(Box::new(err))
    }
}

impl Error {
    /// Whether the error is caused by the caller rather than by the data or the host.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::LayerNotFound { .. }
                | Error::InvalidTolerance { .. }
                | Error::ResponseTooLarge { .. }
        )
    }
}
