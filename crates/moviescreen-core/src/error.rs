//! # Store Errors
//!
//! The error vocabulary every store implementation speaks, whether backed by
//! Postgres or held in memory. The API layer maps these to HTTP outcomes;
//! anything that is not a deliberate client-facing condition collapses into
//! an internal error there.

use std::time::Duration;

use thiserror::Error;

use crate::password::PasswordError;
use crate::token::TokenError;

/// Errors returned by token, permission, movie and user stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record matched the lookup (or the token was expired/out of scope).
    #[error("no matching record found")]
    NotFound,

    /// The conditional write matched zero rows: the stored version moved on
    /// since the caller read it, or the record no longer exists.
    #[error("edit conflict")]
    EditConflict,

    /// `users_username_key` unique constraint violation.
    #[error("username already exists")]
    DuplicateUsername,

    /// `users_email_key` unique constraint violation.
    #[error("email already exists")]
    DuplicateEmail,

    /// The operation did not complete within its deadline.
    #[error("store operation exceeded its {0:?} deadline")]
    Timeout(Duration),

    /// Infrastructure failure in the underlying backend.
    #[error("store backend error: {0}")]
    Backend(String),

    /// Token generation failed while issuing a new token.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// Password hashing failed while seeding or updating an account.
    #[error(transparent)]
    Password(#[from] PasswordError),
}
