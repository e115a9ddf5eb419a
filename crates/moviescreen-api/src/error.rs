//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Every error response carries a `{"type": ..., "data": {...}}` body:
//! generic failures use `type: "generic"` with a single `data.message`,
//! validation failures use the payload kind and one message per field.
//! Internal error details are logged and never returned to clients.

use std::collections::BTreeMap;

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use moviescreen_core::{StoreError, Validator};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MSG_INVALID_TOKEN: &str = "invalid or missing authentication token";
pub const MSG_UNAUTHENTICATED: &str = "you must be authenticated to access this resource";
pub const MSG_INVALID_CREDENTIALS: &str = "invalid user credentials";
pub const MSG_NOT_ACTIVATED: &str = "your account must be activated to access this resource";
pub const MSG_NOT_PERMITTED: &str =
    "your account doesn't have the necessary permissions to access this resource";
pub const MSG_RATE_LIMITED: &str = "rate limit exceeded";
pub const MSG_EDIT_CONFLICT: &str =
    "unable to update the record due to an edit conflict, please try again";
pub const MSG_NOT_FOUND: &str = "resource not found";
pub const MSG_INTERNAL: &str = "internal server error";

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// `"generic"` or the kind of payload that failed validation.
    #[serde(rename = "type")]
    pub kind: String,
    pub data: BTreeMap<String, String>,
}

impl ErrorBody {
    pub fn generic(message: impl Into<String>) -> Self {
        Self {
            kind: "generic".to_string(),
            data: BTreeMap::from([("message".to_string(), message.into())]),
        }
    }
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or unresolvable bearer token (401).
    #[error("invalid authentication token")]
    InvalidAuthenticationToken,

    /// Anonymous caller on a route that needs an account (401).
    #[error("authentication required")]
    Unauthenticated,

    /// Email/password pair did not match (401).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Account exists but is not activated (403).
    #[error("account not activated")]
    NotActivated,

    /// Account lacks the route's permission code (403).
    #[error("permission denied")]
    NotPermitted,

    /// Per-client token bucket is empty (429).
    #[error("rate limit exceeded")]
    RateLimited,

    /// Conditional write lost against a concurrent update (409).
    #[error("edit conflict")]
    EditConflict,

    /// Resource not found (404).
    #[error("resource not found")]
    NotFound,

    /// Request could not be parsed (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Request parsed but failed field validation (422).
    #[error("{} failed validation", .0.kind())]
    Validation(Validator),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidAuthenticationToken | Self::Unauthenticated | Self::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            Self::NotActivated | Self::NotPermitted => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::EditConflict => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the response must carry a `WWW-Authenticate: Bearer` challenge.
    fn challenges(&self) -> bool {
        matches!(self, Self::InvalidAuthenticationToken | Self::Unauthenticated)
    }

    fn body(self) -> ErrorBody {
        match self {
            Self::InvalidAuthenticationToken => ErrorBody::generic(MSG_INVALID_TOKEN),
            Self::Unauthenticated => ErrorBody::generic(MSG_UNAUTHENTICATED),
            Self::InvalidCredentials => ErrorBody::generic(MSG_INVALID_CREDENTIALS),
            Self::NotActivated => ErrorBody::generic(MSG_NOT_ACTIVATED),
            Self::NotPermitted => ErrorBody::generic(MSG_NOT_PERMITTED),
            Self::RateLimited => ErrorBody::generic(MSG_RATE_LIMITED),
            Self::EditConflict => ErrorBody::generic(MSG_EDIT_CONFLICT),
            Self::NotFound => ErrorBody::generic(MSG_NOT_FOUND),
            Self::BadRequest(message) => ErrorBody::generic(message),
            Self::Validation(v) => ErrorBody {
                kind: v.kind().to_string(),
                data: v.into_errors(),
            },
            Self::Internal(_) => ErrorBody::generic(MSG_INTERNAL),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let challenges = self.challenges();

        if let Self::Internal(detail) = &self {
            tracing::error!(error = %detail, "internal server error");
        }

        let mut response = (status, Json(self.body())).into_response();
        if challenges {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<Validator> for AppError {
    fn from(v: Validator) -> Self {
        Self::Validation(v)
    }
}

/// Store outcomes a handler does not special-case become internal errors.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            StoreError::EditConflict => Self::EditConflict,
            other => Self::Internal(other.to_string()),
        }
    }
}
