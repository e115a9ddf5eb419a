//! # Custom Extractors & Validation
//!
//! Provides the [`Validate`] trait for request bodies and helpers to
//! extract and validate JSON in handlers. Malformed JSON (including unknown
//! fields) is a 400; well-formed JSON that breaks a field rule is a 422
//! carrying one message per field.

use axum::extract::rejection::JsonRejection;
use axum::Json;
use moviescreen_core::Validator;

use crate::error::AppError;

/// Request bodies that check field rules beyond what serde enforces.
pub trait Validate {
    fn validate(&self) -> Result<(), Validator>;
}

/// Extract a JSON body, mapping deserialization errors to [`AppError::BadRequest`].
///
/// ```ignore
/// async fn handler(body: Result<Json<T>, JsonRejection>) -> Result<..., AppError> {
///     let req = extract_json(body)?;
/// }
/// ```
pub fn extract_json<T>(result: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    result
        .map(|Json(v)| v)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// Extract a JSON body and validate it using the [`Validate`] trait.
pub fn extract_validated_json<T: Validate>(
    result: Result<Json<T>, JsonRejection>,
) -> Result<T, AppError> {
    let value = extract_json(result)?;
    value.validate()?;
    Ok(value)
}
