//! # Authentication Middleware
//!
//! Resolves the `Authorization` header into an [`Identity`] and attaches it
//! to the request extensions. Handlers and gates read it through the
//! [`CurrentIdentity`] extractor.
//!
//! ## Token Format
//!
//! ```text
//! Authorization: Bearer {26-character base32 token}
//! ```
//!
//! A request without the header proceeds as [`Identity::Anonymous`]; routes
//! that need an account reject it later through [`require_activated_user`].
//! A header that is present but malformed, unknown, expired or of another
//! scope is rejected here with 401 and a `WWW-Authenticate: Bearer`
//! challenge. Store failures during lookup are 500, never 401.
//!
//! Every response passing through carries `Vary: Authorization`.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use moviescreen_core::token::is_well_formed;
use moviescreen_core::{Account, Identity, StoreError, TokenHash, TokenScope};

use crate::error::AppError;
use crate::store::UserStore;

/// Identity attached by [`authenticate`], as a handler/middleware argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentIdentity(pub Identity);

/// A missing identity means the authenticator did not run, which is a
/// routing bug rather than a client error.
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CurrentIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .copied()
            .map(CurrentIdentity)
            .ok_or_else(|| AppError::Internal("no identity in request context".into()))
    }
}

/// Pull the plaintext out of `Bearer <token>`; `None` if the header is not
/// exactly that shape.
fn bearer_token(value: &str) -> Option<&str> {
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if is_well_formed(token) => Some(token),
        _ => None,
    }
}

/// Resolve request headers to an identity.
pub async fn resolve(users: &dyn UserStore, headers: &HeaderMap) -> Result<Identity, AppError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(Identity::Anonymous);
    };

    let plaintext = value
        .to_str()
        .ok()
        .and_then(bearer_token)
        .ok_or_else(|| {
            tracing::debug!("malformed authorization header");
            AppError::InvalidAuthenticationToken
        })?;

    let hash = TokenHash::of(plaintext);
    match users.get_for_token(TokenScope::Authentication, &hash).await {
        Ok(user) => Ok(Identity::Account(Account {
            id: user.id,
            activated: user.activated,
        })),
        Err(StoreError::NotFound) => {
            tracing::debug!("authentication token not recognized");
            Err(AppError::InvalidAuthenticationToken)
        }
        Err(e) => Err(AppError::Internal(format!(
            "resolving authentication token: {e}"
        ))),
    }
}

/// Middleware that attaches the caller's [`Identity`] or rejects the request.
pub async fn authenticate(
    State(users): State<Arc<dyn UserStore>>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut response = match resolve(users.as_ref(), request.headers()).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

/// Route gate: the caller must hold an activated account.
pub async fn require_activated_user(
    CurrentIdentity(identity): CurrentIdentity,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match identity {
        Identity::Anonymous => Err(AppError::Unauthenticated),
        Identity::Account(account) if !account.activated => Err(AppError::NotActivated),
        Identity::Account(_) => Ok(next.run(request).await),
    }
}
