//! Request types and validation for HTTP endpoints.

use serde::{Deserialize, Serialize};

use seamap_lib::ToleranceBucket;

use crate::ProblemDetails;

/// Query string of `GET /api/vector/layer/{identifier}`.
///
/// `simplify` is kept as raw text so malformed values surface as a 400
/// problem body rather than an extractor rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LayerQuery {
    /// Douglas-Peucker tolerance in degrees; absent or `0` means full resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simplify: Option<String>,
}

impl LayerQuery {
    /// The tolerance bucket this query asks for.
    pub fn tolerance(&self, request_id: &str) -> Result<ToleranceBucket, Box<ProblemDetails>> {
        ToleranceBucket::parse(self.simplify.as_deref()).map_err(|_| {
            Box::new(ProblemDetails::bad_request(
                format!(
                    "The 'simplify' parameter must be a non-negative number, got '{}'",
                    self.simplify.as_deref().unwrap_or_default()
                ),
                request_id,
            ))
        })
    }
}
