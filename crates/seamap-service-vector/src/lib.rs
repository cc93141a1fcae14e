//! Seamap vector layer HTTP microservice.
//!
//! Serves the layers discovered by the [`seamap_lib::Catalog`] as GeoJSON,
//! with optional per-request simplification and conditional GET.
//!
//! # Endpoints
//!
//! - `GET /api/vector/layers` - Metadata of every registered layer
//! - `GET /api/vector/layer/{identifier}?simplify=<degrees>` - One layer as a FeatureCollection
//! - `GET /api/vector/bounds` - Union bounds across all layers
//! - `GET /metrics` - Prometheus metrics endpoint
//! - `GET /health/live` - Kubernetes liveness probe
//! - `GET /health/ready` - Kubernetes readiness probe
//!
//! The identifier is a display name (`Archipelago`) or the composite
//! `source_file/layer_name` id (`archipelago.gpkg/archipelago`).

use axum::{
    Router,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
    http::{HeaderMap, Method, header},
    response::{IntoResponse, Response as HttpResponse},
    routing::get,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, warn};

use seamap_lib::{BoundsSummary, CacheStatus, LayerListing};
use seamap_service_shared::{
    AppState, GeoJsonResponse, LayerQuery, MetricsLayer, ProblemDetails, RequestId,
    ServiceResponse, from_lib_error, health_live, health_ready, metrics_handler,
    record_layer_failure, record_layer_response, record_payload_bytes, record_response_cache,
};

/// JSON response - either success or RFC 9457 error.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Response<T> {
    Success(T),
    Error(ProblemDetails),
}

impl<T: Serialize> IntoResponse for Response<T> {
    fn into_response(self) -> HttpResponse {
        match self {
            Response::Success(data) => ServiceResponse::new(data).into_response(),
            Response::Error(problem) => problem.into_response(),
        }
    }
}

/// Build the service router over `state`.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD])
        .allow_headers([header::IF_NONE_MATCH])
        .expose_headers([header::ETAG, header::CACHE_CONTROL]);

    Router::new()
        .route("/api/vector/layers", get(layers_handler))
        .route("/api/vector/layer/{*identifier}", get(layer_handler))
        .route("/api/vector/bounds", get(bounds_handler))
        .route("/metrics", get(metrics_handler))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .layer(cors)
        .layer(MetricsLayer)
        .with_state(state)
}

/// Handle GET /api/vector/layers.
async fn layers_handler(State(state): State<AppState>) -> Response<LayerListing> {
    let listing = state.catalog().listing();
    debug!(count = listing.count, "listing vector layers");
    Response::Success(listing)
}

/// Handle GET /api/vector/bounds.
async fn bounds_handler(State(state): State<AppState>) -> Response<BoundsSummary> {
    Response::Success(state.catalog().bounds_summary())
}

/// Handle GET /api/vector/layer/{identifier}.
///
/// Loading and serialization run on the blocking pool under the configured
/// load budget; an exhausted budget answers 503 while the work finishes in
/// the background and still populates the caches.
async fn layer_handler(
    State(state): State<AppState>,
    identifier: Result<Path<String>, PathRejection>,
    query: Result<Query<LayerQuery>, QueryRejection>,
    request_id: RequestId,
    headers: HeaderMap,
) -> HttpResponse {
    let identifier = match identifier {
        Ok(Path(identifier)) => identifier,
        Err(rejection) => {
            debug!(request_id = %request_id, error = %rejection.body_text(), "rejected layer path");
            record_layer_failure("bad_request");
            return ProblemDetails::bad_request(rejection.body_text(), request_id.as_str())
                .into_response();
        }
    };
    let query = match query {
        Ok(Query(query)) => query,
        Err(rejection) => {
            debug!(request_id = %request_id, error = %rejection.body_text(), "rejected layer query");
            record_layer_failure("bad_request");
            return ProblemDetails::bad_request(rejection.body_text(), request_id.as_str())
                .into_response();
        }
    };

    let bucket = match query.tolerance(request_id.as_str()) {
        Ok(bucket) => bucket,
        Err(problem) => {
            record_layer_failure("bad_request");
            return problem.into_response();
        }
    };

    let if_none_match = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let catalog = state.catalog_arc();
    let lookup = identifier.clone();
    let task = tokio::task::spawn_blocking(move || {
        catalog.layer_response(&lookup, bucket, if_none_match.as_deref())
    });

    let outcome = match tokio::time::timeout(state.load_timeout(), task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => {
            error!(request_id = %request_id, layer = %identifier, error = %join_error, "layer task failed");
            record_layer_failure("internal");
            return ProblemDetails::internal_error("Failed to load layer data", request_id.as_str())
                .into_response();
        }
        Err(_) => {
            warn!(
                request_id = %request_id,
                layer = %identifier,
                timeout_ms = state.load_timeout().as_millis() as u64,
                "layer load timed out"
            );
            record_layer_failure("timeout");
            return ProblemDetails::service_unavailable(
                "Layer data is still loading; retry shortly",
                request_id.as_str(),
            )
            .into_response();
        }
    };

    match outcome {
        Ok(layer_response) => {
            let responded = layer_response.responded;
            if responded.is_not_modified() {
                record_layer_response("not_modified");
            } else {
                record_layer_response(match layer_response.cache_status {
                    CacheStatus::Hit => "hit",
                    CacheStatus::Miss => "miss",
                });
                record_payload_bytes(responded.body.len());
            }
            if layer_response.cache_status == CacheStatus::Miss {
                let cache = state.catalog().response_cache();
                record_response_cache(cache.len(), cache.total_bytes());
            }
            debug!(
                request_id = %request_id,
                layer = %layer_response.layer.id,
                status = responded.status,
                cache = layer_response.cache_status.as_str(),
                "served vector layer"
            );
            GeoJsonResponse::new(responded, layer_response.cache_status).into_response()
        }
        Err(e) => {
            let problem = from_lib_error(&e, request_id.as_str());
            record_layer_failure(match problem.status {
                404 => "not_found",
                400 => "bad_request",
                413 => "too_large",
                _ => "internal",
            });
            if e.is_client_error() {
                debug!(request_id = %request_id, layer = %identifier, error = %e, "layer request rejected");
            }
            problem.into_response()
        }
    }
}
