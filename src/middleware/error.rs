use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Request failures of the LTI routes and APIs.
///
/// Every variant renders as a fixed status and a JSON body
/// `{ "error": <code>, "message": <generic text> }`. The carried detail is
/// for logs only and never reaches the response.
#[derive(Debug, thiserror::Error)]
pub enum LtiError {
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("unknown client: {0}")]
    UnknownClient(String),

    #[error("missing id_token")]
    MissingToken,

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error("invalid nonce")]
    InvalidNonce,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("invalid claims: {0}")]
    InvalidClaims(String),

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("not authenticated")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("session store error: {0}")]
    Store(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: &'static str,
}

impl LtiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingParameter(_)
            | Self::UnknownClient(_)
            | Self::MissingToken
            | Self::InvalidState(_)
            | Self::InvalidNonce
            | Self::InvalidToken(_)
            | Self::InvalidClaims(_)
            | Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "missing_parameter",
            Self::UnknownClient(_) => "unknown_client",
            Self::MissingToken => "missing_token",
            Self::InvalidState(_) => "invalid_state",
            Self::InvalidNonce => "invalid_nonce",
            Self::InvalidToken(_) => "invalid_token",
            Self::InvalidClaims(_) => "invalid_claims",
            Self::InvalidBody(_) => "invalid_body",
            Self::Unauthenticated => "unauthenticated",
            Self::Forbidden => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::GatewayUnavailable(_) => "gateway_unavailable",
            Self::Configuration(_) => "configuration_error",
            Self::Store(_) => "internal_error",
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            Self::MissingParameter(_) => "A required parameter is missing.",
            Self::UnknownClient(_) => "The platform registration is not recognized.",
            Self::MissingToken => "The launch did not include an id_token.",
            Self::InvalidState(_) => {
                "The launch session is invalid or has expired. Relaunch the tool from your course."
            }
            Self::InvalidNonce | Self::InvalidToken(_) | Self::InvalidClaims(_) => {
                "The launch could not be verified. Relaunch the tool from your course."
            }
            Self::InvalidBody(_) => "The request body is invalid.",
            Self::Unauthenticated => "Authentication required. Launch the tool from your course.",
            Self::Forbidden => "You do not have access to this page.",
            Self::NotFound(_) => "The requested item does not exist.",
            Self::GatewayUnavailable(_) => {
                "Course content is temporarily unavailable. Try again shortly."
            }
            Self::Configuration(_) => "The tool is not fully configured.",
            Self::Store(_) => "Internal error.",
        }
    }
}

impl IntoResponse for LtiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "LTI request failed");
        }
        let body = ErrorBody {
            error: self.code(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
