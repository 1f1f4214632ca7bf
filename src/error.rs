//! Request-level error taxonomy.
//!
//! # Responsibilities
//! - Name every way the gating pipeline or a mutation can refuse a request
//! - Map each refusal to its client-visible status code and JSON envelope
//! - Keep server-fault detail in the logs, never in the response body
//!
//! # Status mapping
//! ```text
//! RateLimitExceeded                     → 429
//! InvalidToken / AuthenticationRequired → 401 (+ WWW-Authenticate: Bearer)
//! InvalidCredentials                    → 401
//! AccountNotActivated / PermissionDenied→ 403
//! NotFound                              → 404
//! MethodNotAllowed                      → 405
//! EditConflict                          → 409
//! InvalidInput                          → 400
//! FailedValidation / Duplicate         → 422
//! Fault                                 → 500
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::observability::metrics;

/// Failure reported by a store boundary (credential, permission or resource store).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The operation did not complete within its deadline.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The backend could not serve the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A unique field would hold the same value in two records.
    #[error("duplicate value for unique field {field}")]
    Duplicate { field: &'static str },

    /// The version counter of a resource cannot be advanced any further.
    #[error("version counter exhausted for resource {0}")]
    VersionExhausted(i64),
}

/// Every outcome that stops a request short of a successful response.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("invalid or missing authentication token")]
    InvalidToken,

    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,

    #[error("invalid authentication credentials")]
    InvalidCredentials,

    #[error("your user account must be activated to access this resource")]
    AccountNotActivated,

    #[error("your user account doesn't have the necessary permissions to access this resource")]
    PermissionDenied,

    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,

    #[error("the requested resource could not be found")]
    NotFound,

    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("failed validation")]
    FailedValidation(BTreeMap<&'static str, String>),

    #[error("a record with this {field} already exists")]
    Duplicate { field: &'static str },

    /// Anything the client cannot fix: store outage, timeout, broken invariant.
    #[error("server fault: {0}")]
    Fault(String),
}

impl Error {
    pub fn fault(detail: impl std::fmt::Display) -> Self {
        Error::Fault(detail.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Error::InvalidToken | Error::AuthenticationRequired | Error::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            Error::AccountNotActivated | Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::EditConflict => StatusCode::CONFLICT,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::FailedValidation(_) | Error::Duplicate { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Fault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether repeating the identical request later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimitExceeded | Error::Fault(_))
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate { field } => Error::Duplicate { field },
            other => Error::Fault(other.to_string()),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

const FAULT_MESSAGE: &str = "the server encountered a problem and could not process your request";

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            Error::Fault(detail) => {
                tracing::error!(error = %detail, "Server fault");
                serde_json::json!({ "error": FAULT_MESSAGE })
            }
            Error::FailedValidation(fields) => serde_json::json!({ "error": fields }),
            Error::Duplicate { field } => {
                let mut fields = serde_json::Map::new();
                fields.insert(field.to_string(), self.to_string().into());
                serde_json::json!({ "error": fields })
            }
            other => serde_json::json!({ "error": other.to_string() }),
        };

        match &self {
            Error::EditConflict => metrics::record_edit_conflict(),
            Error::InvalidToken => metrics::record_auth_failure("invalid_token"),
            Error::AuthenticationRequired => metrics::record_auth_failure("authentication_required"),
            Error::AccountNotActivated => metrics::record_auth_failure("not_activated"),
            Error::PermissionDenied => metrics::record_auth_failure("permission_denied"),
            _ => {}
        }

        let mut response = (status, Json(body)).into_response();
        if matches!(self, Error::InvalidToken | Error::AuthenticationRequired) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}
