//! RFC 9457 Problem Details for HTTP APIs.
//!
//! Every error body carries the RFC fields plus a human-readable `error`
//! message and a machine-readable `code`.
//! See: <https://www.rfc-editor.org/rfc/rfc9457.html>

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use seamap_lib::Error as LibError;

/// Problem type URI for unresolved layer identifiers.
pub const PROBLEM_LAYER_NOT_FOUND: &str = "/problems/layer-not-found";

/// Problem type URI for invalid request parameters.
pub const PROBLEM_INVALID_REQUEST: &str = "/problems/invalid-request";

/// Problem type URI for payloads above the configured ceiling.
pub const PROBLEM_RESPONSE_TOO_LARGE: &str = "/problems/response-too-large";

/// Problem type URI for internal server errors.
pub const PROBLEM_INTERNAL_ERROR: &str = "/problems/internal-error";

/// Problem type URI for service unavailable (e.g., a layer load timed out).
pub const PROBLEM_SERVICE_UNAVAILABLE: &str = "/problems/service-unavailable";

/// RFC 9457 Problem Details response structure.
///
/// # Example
///
/// ```
/// use seamap_service_shared::{ProblemDetails, PROBLEM_LAYER_NOT_FOUND};
/// use axum::http::StatusCode;
///
/// let problem = ProblemDetails::new(
///     PROBLEM_LAYER_NOT_FOUND,
///     "Layer Not Found",
///     StatusCode::NOT_FOUND,
///     "NOT_FOUND",
/// )
/// .with_error("layer not found: Atlantis")
/// .with_request_id("req-12345");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// URI reference identifying the problem type (relative).
    #[serde(rename = "type")]
    pub type_uri: String,

    /// Short, human-readable summary of the problem.
    pub title: String,

    /// HTTP status code for this problem.
    pub status: u16,

    /// Explanation specific to this occurrence.
    pub error: String,

    /// Stable machine-readable code (`NOT_FOUND`, `BAD_REQUEST`, ...).
    pub code: String,

    /// URI reference identifying the specific occurrence (the request ID).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ProblemDetails {
    /// Create a new ProblemDetails; `error` defaults to the title.
    pub fn new(
        type_uri: impl Into<String>,
        title: impl Into<String>,
        status: StatusCode,
        code: impl Into<String>,
    ) -> Self {
        let title = title.into();
        Self {
            type_uri: type_uri.into(),
            error: title.clone(),
            title,
            status: status.as_u16(),
            code: code.into(),
            instance: None,
        }
    }

    /// Replace the occurrence-specific message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self
    }

    /// Add the request identifier for tracing.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.instance = Some(request_id.into());
        self
    }

    /// Create a 400 Bad Request problem for invalid input.
    pub fn bad_request(error: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_INVALID_REQUEST,
            "Invalid Request",
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
        )
        .with_error(error)
        .with_request_id(request_id)
    }

    /// Create a 404 Not Found problem for an unresolved layer.
    pub fn layer_not_found(identifier: &str, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_LAYER_NOT_FOUND,
            "Layer Not Found",
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
        )
        .with_error(format!("Vector layer '{}' not found", identifier))
        .with_request_id(request_id)
    }

    /// Create a 413 problem for a payload above the ceiling.
    pub fn response_too_large(error: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_RESPONSE_TOO_LARGE,
            "Response Too Large",
            StatusCode::PAYLOAD_TOO_LARGE,
            "RESPONSE_TOO_LARGE",
        )
        .with_error(error)
        .with_request_id(request_id)
    }

    /// Create a 500 Internal Server Error problem.
    pub fn internal_error(error: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_INTERNAL_ERROR,
            "Internal Error",
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
        )
        .with_error(error)
        .with_request_id(request_id)
    }

    /// Create a 503 Service Unavailable problem.
    pub fn service_unavailable(error: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self::new(
            PROBLEM_SERVICE_UNAVAILABLE,
            "Service Unavailable",
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
        )
        .with_error(error)
        .with_request_id(request_id)
    }
}

impl std::fmt::Display for ProblemDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.title, self.code, self.error)
    }
}

impl std::error::Error for ProblemDetails {}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let mut response = Json(&self).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );

        *response.status_mut() = status;
        response
    }
}

/// Convert library errors to ProblemDetails.
///
/// Data and host failures are reported generically; their details (which
/// may carry file paths) are logged, never returned.
pub fn from_lib_error(error: &LibError, request_id: &str) -> ProblemDetails {
    match error {
        LibError::LayerNotFound { identifier } => {
            ProblemDetails::layer_not_found(identifier, request_id)
        }
        LibError::InvalidTolerance { .. } => {
            ProblemDetails::bad_request(error.to_string(), request_id)
        }
        LibError::ResponseTooLarge { .. } => {
            ProblemDetails::response_too_large(error.to_string(), request_id)
        }
        _ => {
            tracing::error!(request_id, error = %error, "layer request failed");
            ProblemDetails::internal_error("Failed to load layer data", request_id)
        }
    }
}
