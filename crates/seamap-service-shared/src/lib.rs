//! Shared infrastructure for Seamap HTTP microservices.
//!
//! This crate provides common functionality used by the service containers:
//!
//! - [`AppState`]: The discovered vector catalog and the per-request load budget
//! - [`ServiceConfig`]: Environment-driven configuration
//! - [`health`]: Health check handlers for Kubernetes liveness/readiness probes
//! - [`ProblemDetails`]: RFC 9457 Problem Details for consistent error responses
//! - [`ServiceResponse`] and [`GeoJsonResponse`]: Success bodies and headers
//! - [`metrics`]: Prometheus metrics infrastructure
//! - [`logging`]: Structured JSON logging setup
//! - [`middleware`]: Request tracking and metrics middleware
//! - [`LayerQuery`]: Layer request parameters with validation
//!
//! # Architecture
//!
//! Handlers stay thin; everything that touches geometry lives in
//! `seamap-lib`:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  axum Handler                                               │
//! │  - Parse path and query                                     │
//! │  - Validate parameters                                      │
//! │  - Call seamap-lib Catalog APIs (off the async runtime)     │
//! │  - Format response and headers                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Testing Support
//!
//! The [`test_utils`] module writes fixture datasets and builds isolated
//! state for handler testing. Enable the `test-utils` feature to access it
//! from dependent crates.

#![deny(warnings)]

pub mod config;
mod health;
pub mod logging;
pub mod metrics;
pub mod middleware;
mod problem;
mod request;
mod response;
mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::ServiceConfig;
pub use health::{health_live, health_ready, HealthStatus};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{
    init_metrics, metrics_handler, record_catalog_state, record_layer_failure,
    record_layer_response, record_payload_bytes, record_response_cache, MetricsConfig,
    MetricsError,
};
pub use middleware::{extract_or_generate_request_id, MetricsLayer, RequestId};
pub use problem::{
    from_lib_error, ProblemDetails, PROBLEM_INTERNAL_ERROR, PROBLEM_INVALID_REQUEST,
    PROBLEM_LAYER_NOT_FOUND, PROBLEM_RESPONSE_TOO_LARGE, PROBLEM_SERVICE_UNAVAILABLE,
};
pub use request::LayerQuery;
pub use response::{GeoJsonResponse, ServiceResponse, CACHE_STATUS_HEADER};
pub use state::{AppState, AppStateError};
