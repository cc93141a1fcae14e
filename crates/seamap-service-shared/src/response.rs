//! Response wrappers for successful HTTP responses.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use seamap_lib::{CacheStatus, Responded, GEOJSON_CONTENT_TYPE};

/// Header reporting whether a layer payload came from the response cache.
pub const CACHE_STATUS_HEADER: &str = "x-cache";

/// JSON body with an explicit content type.
///
/// # Example
///
/// ```
/// use seamap_service_shared::ServiceResponse;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Listing {
///     count: usize,
/// }
///
/// let response = ServiceResponse::new(Listing { count: 3 });
/// assert_eq!(response.content_type, "application/json");
/// ```
#[derive(Debug, Clone)]
pub struct ServiceResponse<T> {
    /// The actual response payload.
    pub data: T,

    /// Value of the `Content-Type` header.
    pub content_type: &'static str,
}

impl<T> ServiceResponse<T> {
    /// Create a new successful response with the default content type.
    pub fn new(data: T) -> Self {
        Self {
            data,
            content_type: "application/json",
        }
    }

    /// Create a response with a custom content type.
    pub fn with_content_type(data: T, content_type: &'static str) -> Self {
        Self { data, content_type }
    }
}

impl<T> From<T> for ServiceResponse<T> {
    fn from(data: T) -> Self {
        Self::new(data)
    }
}

impl<T: Serialize> IntoResponse for ServiceResponse<T> {
    fn into_response(self) -> Response {
        let mut response = Json(self.data).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(self.content_type),
        );
        response
    }
}

/// A layer payload (or its 304) with validator and caching headers.
#[derive(Debug, Clone)]
pub struct GeoJsonResponse {
    pub responded: Responded,
    pub cache_status: CacheStatus,
}

impl GeoJsonResponse {
    pub fn new(responded: Responded, cache_status: CacheStatus) -> Self {
        Self {
            responded,
            cache_status,
        }
    }
}

impl IntoResponse for GeoJsonResponse {
    fn into_response(self) -> Response {
        let Responded {
            status,
            body,
            etag,
            cache_control,
        } = self.responded;

        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&etag) {
            headers.insert(header::ETAG, value);
        }
        if let Ok(value) = HeaderValue::from_str(&cache_control) {
            headers.insert(header::CACHE_CONTROL, value);
        }
        if status != StatusCode::NOT_MODIFIED {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(GEOJSON_CONTENT_TYPE),
            );
        }
        headers.insert(
            CACHE_STATUS_HEADER,
            HeaderValue::from_static(self.cache_status.as_str()),
        );
        response
    }
}
