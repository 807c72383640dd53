//! Error types shared across the workbench.

use thiserror::Error;

use crate::routes::Route;

/// Failure talking to the offset backend.
///
/// `Clone` so a single in-flight fetch can hand the same failure to every
/// caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("API Error: {status} {reason}")]
    Status { status: u16, reason: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ApiError::Timeout;
        }
        if err.is_decode() {
            return ApiError::Decode(err.to_string());
        }
        if let Some(status) = err.status() {
            return ApiError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            };
        }
        ApiError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Failure of a credit-builder or report workflow step.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("no facility selected")]
    NoFacility,
    #[error("failed to load facility: {0}")]
    FacilityLoad(ApiError),
    #[error("facility data not loaded")]
    FacilityNotLoaded,
    #[error("no sites selected")]
    EmptySelection,
    #[error("missing project data")]
    MissingRouteParams,
    #[error("no site data found")]
    MissingHandoff,
    #[error("malformed handoff payload: {0}")]
    MalformedHandoff(String),
    #[error("handoff store error: {0}")]
    Store(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl WorkflowError {
    /// Where the user is sent when this error aborts the current view.
    ///
    /// `None` means the user stays put and may retry.
    pub fn redirect(&self, facility_id: Option<&str>) -> Option<Route> {
        match self {
            WorkflowError::NoFacility | WorkflowError::FacilityLoad(_) | WorkflowError::MissingRouteParams => {
                Some(Route::Map)
            }
            WorkflowError::MissingHandoff | WorkflowError::MalformedHandoff(_) => {
                Some(Route::CreditBuilder {
                    facility: facility_id.map(str::to_string),
                })
            }
            _ => None,
        }
    }
}
