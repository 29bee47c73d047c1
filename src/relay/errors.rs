//! Usage: Relay error taxonomy and its HTTP responses (`{"error": ..., "details"?: ...}`).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

use crate::protocol::RelayErrorBody;

#[derive(Debug, thiserror::Error)]
pub(crate) enum RelayError {
    #[error("Request body must be valid JSON.")]
    InvalidJson,
    #[error("Authorization code is missing from request body.")]
    MissingCode,
    #[error("Code verifier is missing from request body.")]
    MissingVerifier,
    #[error("Server configuration error.")]
    Misconfigured,
    /// The provider answered but did not issue a token. `status` is echoed to the caller.
    #[error("Failed to exchange GitHub token with GitHub API.")]
    ProviderRejected { status: StatusCode, details: Value },
    #[error("No response from GitHub token endpoint.")]
    NoResponse,
    #[error("Internal server error setting up GitHub token request.")]
    Internal,
}

impl RelayError {
    pub(crate) fn status(&self) -> StatusCode {
        match self {
            Self::InvalidJson | Self::MissingCode | Self::MissingVerifier => {
                StatusCode::BAD_REQUEST
            }
            Self::ProviderRejected { status, .. } => *status,
            Self::Misconfigured | Self::NoResponse | Self::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub(crate) fn body(&self) -> RelayErrorBody {
        let details = match self {
            Self::ProviderRejected { details, .. } => Some(details.clone()),
            _ => None,
        };
        RelayErrorBody {
            error: self.to_string(),
            details,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
