//! Argon2id password hashes in PHC string format.

use std::fmt;

use argon2::password_hash::{self, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand_core::OsRng;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("stored password hash is malformed: {0}")]
    Malformed(String),
}

/// An Argon2id PHC string (`$argon2id$v=19$...`).
///
/// Never serialized; `Debug` prints only the algorithm prefix.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Hash `plaintext` under a fresh random salt.
    pub fn create(plaintext: &str) -> Result<Self, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hash(e.to_string()))?;
        Ok(Self(hash.to_string()))
    }

    /// Wrap a PHC string read back from storage.
    pub fn from_phc(phc: impl Into<String>) -> Self {
        Self(phc.into())
    }

    pub fn as_phc(&self) -> &str {
        &self.0
    }

    /// Whether `plaintext` hashes to this value.
    ///
    /// A mismatch is `Ok(false)`; only a malformed stored hash is an error.
    pub fn matches(&self, plaintext: &str) -> Result<bool, PasswordError> {
        let parsed = password_hash::PasswordHash::new(&self.0)
            .map_err(|e| PasswordError::Malformed(e.to_string()))?;
        if parsed.hash.is_none() {
            return Err(PasswordError::Malformed("no hash output".into()));
        }
        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => Err(PasswordError::Malformed(e.to_string())),
        }
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let algorithm = self.0.split('$').nth(1).unwrap_or("unknown");
        write!(f, "PasswordHash({algorithm}, [REDACTED])")
    }
}
