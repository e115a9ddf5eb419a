//! Per-field validation error collection.
//!
//! A [`Validator`] is tagged with the kind of payload it checks (`"movie"`,
//! `"user"`, `"filters"`). That kind becomes the `type` of the 422 response
//! body and each failing field contributes one message.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

/// Accumulates field errors for a single request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    kind: &'static str,
    errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            errors: BTreeMap::new(),
        }
    }

    /// Record `message` against `field`. The first message per field wins.
    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors
            .entry(field.to_string())
            .or_insert_with(|| message.to_string());
    }

    /// Record `message` against `field` unless `ok` holds.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }

    pub fn into_errors(self) -> BTreeMap<String, String> {
        self.errors
    }

    /// `Ok(())` when no errors were recorded, otherwise the validator itself.
    pub fn finish(self) -> Result<(), Validator> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

/// Whether `value` contains something other than whitespace.
pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Length in characters, not bytes.
pub fn char_len(value: &str) -> usize {
    value.chars().count()
}

/// Whether every element of `values` is distinct.
pub fn unique<T: Ord>(values: &[T]) -> bool {
    let mut seen = std::collections::BTreeSet::new();
    values.iter().all(|v| seen.insert(v))
}

fn email_pattern() -> Option<&'static Regex> {
    static EMAIL_RX: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_RX
        .get_or_init(|| {
            Regex::new(
                r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
            )
            .ok()
        })
        .as_ref()
}

/// Whether `value` has the shape of an email address.
pub fn is_email(value: &str) -> bool {
    email_pattern().is_some_and(|rx| rx.is_match(value))
}
