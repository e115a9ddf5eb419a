//! # User Accounts
//!
//! [`User`] is a versioned account record. Each account endpoint checks the
//! [`UserField`]s its request carries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::password::PasswordHash;
use crate::token::TOKEN_LENGTH;
use crate::validation::{char_len, is_email, not_blank, Validator};
use crate::version::{Version, Versioned};

pub const MAX_USERNAME_CHARS: usize = 500;
pub const MIN_PASSWORD_CHARS: usize = 8;
pub const MAX_PASSWORD_CHARS: usize = 72;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored account. The password hash is never serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password: PasswordHash,
    pub activated: bool,
    #[serde(skip)]
    pub version: Version,
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,
}

impl Versioned for User {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

/// A validated registration awaiting insertion.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: PasswordHash,
}

impl NewUser {
    pub fn into_user(self, id: UserId, created_at: DateTime<Utc>) -> User {
        User {
            id,
            username: self.username,
            email: self.email,
            password: self.password,
            activated: false,
            version: Version::INITIAL,
            created_at,
        }
    }
}

/// Fields an account request may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserField {
    Username,
    Email,
    Password,
    Token,
}

impl UserField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Username => "username",
            Self::Email => "email",
            Self::Password => "password",
            Self::Token => "token",
        }
    }
}

impl UserField {
    /// Require `value` and record the first rule it breaks on `v`.
    pub fn check(&self, v: &mut Validator, value: Option<&str>) {
        let field = self.as_str();
        let Some(value) = value else {
            v.add_error(field, "must be provided");
            return;
        };

        match self {
            Self::Username => {
                v.check(not_blank(value), field, "must not be blank");
                v.check(
                    char_len(value) <= MAX_USERNAME_CHARS,
                    field,
                    "must not have more than 500 characters",
                );
            }
            Self::Email => {
                v.check(not_blank(value), field, "must not be blank");
                v.check(is_email(value), field, "must be a valid email address");
            }
            Self::Password => {
                v.check(not_blank(value), field, "must not be blank");
                v.check(
                    char_len(value) >= MIN_PASSWORD_CHARS,
                    field,
                    "must have at least 8 characters",
                );
                v.check(
                    char_len(value) <= MAX_PASSWORD_CHARS,
                    field,
                    "must not have more than 72 characters",
                );
            }
            Self::Token => {
                v.check(
                    char_len(value) == TOKEN_LENGTH,
                    field,
                    "must have exactly 26 characters",
                );
            }
        }
    }
}

/// Normalize an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(fields: &[(UserField, Option<&str>)]) -> Result<(), Validator> {
        let mut v = Validator::new("user");
        for (field, value) in fields {
            field.check(&mut v, *value);
        }
        v.finish()
    }

    #[test]
    fn missing_fields_must_be_provided() {
        let err = check(&[
            (UserField::Username, None),
            (UserField::Email, None),
            (UserField::Password, None),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), "user");
        assert_eq!(err.errors().len(), 3);
        assert_eq!(err.errors()["email"], "must be provided");
    }

    #[test]
    fn valid_registration_passes() {
        let ok = check(&[
            (UserField::Username, Some("alice")),
            (UserField::Email, Some("alice@example.com")),
            (UserField::Password, Some("pa55word!")),
        ]);
        assert!(ok.is_ok());
    }

    #[test]
    fn password_length_bounds() {
        let short = check(&[(UserField::Password, Some("short"))]);
        assert_eq!(
            short.unwrap_err().errors()["password"],
            "must have at least 8 characters"
        );
        let long = "x".repeat(73);
        let long = check(&[(UserField::Password, Some(long.as_str()))]);
        assert_eq!(
            long.unwrap_err().errors()["password"],
            "must not have more than 72 characters"
        );
    }

    #[test]
    fn bad_email_and_blank_username() {
        let err = check(&[
            (UserField::Username, Some(" ")),
            (UserField::Email, Some("not-an-email")),
        ])
        .unwrap_err();
        assert_eq!(err.errors()["username"], "must not be blank");
        assert_eq!(err.errors()["email"], "must be a valid email address");
    }

    #[test]
    fn token_must_be_26_chars() {
        let err = check(&[(UserField::Token, Some("ABC"))]).unwrap_err();
        assert_eq!(err.errors()["token"], "must have exactly 26 characters");

        let token = "A".repeat(26);
        assert!(check(&[(UserField::Token, Some(token.as_str()))]).is_ok());
    }

    #[test]
    fn user_json_hides_password_and_version() {
        let user = NewUser {
            username: "alice".into(),
            email: "alice@example.com".into(),
            password: PasswordHash::from_phc("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"),
        }
        .into_user(UserId(1), Utc::now());
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("password").is_none());
        assert!(value.get("version").is_none());
        assert_eq!(value["activated"], false);
        assert!(value.get("created").is_some());
    }

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }
}
