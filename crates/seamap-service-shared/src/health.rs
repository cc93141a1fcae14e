//! Health check handlers for Kubernetes probes.
//!
//! `/health/live` always answers while the process runs; `/health/ready`
//! requires at least one registered vector layer.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::AppState;

/// Health status response for liveness and readiness probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Status indicator: "ok" or "not_ready: <reason>".
    pub status: String,

    /// Service name for identification.
    pub service: String,

    /// Service version from build-time.
    pub version: String,

    /// Number of registered layers (for readiness check).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers_loaded: Option<usize>,

    /// Registry generation currently served.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,

    /// RFC 3339 time of the last discovery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<String>,
}

impl HealthStatus {
    /// Create a healthy liveness status.
    pub fn alive(service: &str, version: &str) -> Self {
        Self {
            status: "ok".to_string(),
            service: service.to_string(),
            version: version.to_string(),
            layers_loaded: None,
            generation: None,
            loaded_at: None,
        }
    }

    /// Create a ready status with catalog information.
    pub fn ready(
        service: &str,
        version: &str,
        layers: usize,
        generation: u64,
        loaded_at: String,
    ) -> Self {
        Self {
            layers_loaded: Some(layers),
            generation: Some(generation),
            loaded_at: Some(loaded_at),
            ..Self::alive(service, version)
        }
    }

    /// Create a not-ready status.
    pub fn not_ready(service: &str, version: &str, reason: &str) -> Self {
        Self {
            status: format!("not_ready: {}", reason),
            ..Self::alive(service, version)
        }
    }
}

/// Liveness probe handler.
///
/// ```text
/// GET /health/live
/// {"status":"ok","service":"seamap-service-shared","version":"0.1.0"}
/// ```
pub async fn health_live() -> impl IntoResponse {
    let status = HealthStatus::alive(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    (StatusCode::OK, Json(status))
}

/// Readiness probe handler.
///
/// ```text
/// GET /health/ready
/// {"status":"ok",...,"layers_loaded":5,"generation":1,"loaded_at":"2026-01-01T00:00:00Z"}
/// ```
pub async fn health_ready(State(state): State<AppState>) -> Response {
    let service = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");

    let snapshot = state.catalog().snapshot();
    if snapshot.is_empty() {
        let status = HealthStatus::not_ready(service, version, "no vector layers registered");
        return (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response();
    }

    let status = HealthStatus::ready(
        service,
        version,
        snapshot.len(),
        snapshot.generation(),
        snapshot.loaded_at().to_rfc3339(),
    );
    (StatusCode::OK, Json(status)).into_response()
}
