//! # Scoped Bearer Tokens
//!
//! Opaque tokens are 16 bytes from the OS CSPRNG, base32-encoded without
//! padding into a 26-character plaintext. Only the SHA-256 of the plaintext
//! is ever persisted; the plaintext leaves the process exactly once, in the
//! issuance response or the outbound notification that carries it.
//!
//! ## Security Invariant
//!
//! A stored [`TokenHash`] cannot be turned back into a usable token. A
//! presented plaintext is re-hashed with [`TokenHash::of`] and compared
//! against stored hashes, so lookup stays an indexed equality match.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::user::UserId;

/// Length of every plaintext token (base32 of 16 random bytes).
pub const TOKEN_LENGTH: usize = 26;

/// Random bytes drawn per token.
const TOKEN_ENTROPY_BYTES: usize = 16;

/// RFC 4648 base32 alphabet.
const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Errors produced while minting tokens.
#[derive(Error, Debug)]
pub enum TokenError {
    /// The operating system's random source failed.
    #[error("secure random source unavailable: {0}")]
    Rng(String),
}

/// The single operation class a token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenScope {
    /// Account activation after registration.
    Activation,
    /// Bearer authentication of API requests.
    Authentication,
    /// One-shot password reset.
    PasswordReset,
}

impl TokenScope {
    /// Return the string stored in the `scope` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Activation => "activation",
            Self::Authentication => "authentication",
            Self::PasswordReset => "password-reset",
        }
    }

    /// Lifetime of a freshly issued token of this scope.
    pub fn lifetime(&self) -> Duration {
        match self {
            Self::Activation => Duration::hours(48),
            Self::Authentication => Duration::hours(24),
            Self::PasswordReset => Duration::minutes(15),
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SHA-256 digest of a plaintext token.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    /// Hash a presented plaintext for lookup or storage.
    pub fn of(plaintext: &str) -> Self {
        Self(Sha256::digest(plaintext.as_bytes()).into())
    }

    /// Wrap a digest read back from storage.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Return the digest as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenHash({})", self.to_hex())
    }
}

/// A freshly minted token, still carrying its plaintext.
///
/// Custom `Debug` redacts the plaintext so issued tokens never reach logs.
#[derive(Clone)]
pub struct Token {
    plaintext: String,
    pub hash: TokenHash,
    pub owner: UserId,
    pub scope: TokenScope,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// Mint a token for `owner` valid for `lifetime` from now.
    ///
    /// Fails only if the OS random source fails; callers must treat that as
    /// an internal error rather than fall back to a weaker source.
    pub fn generate(owner: UserId, scope: TokenScope, lifetime: Duration) -> Result<Self, TokenError> {
        let mut entropy = [0u8; TOKEN_ENTROPY_BYTES];
        OsRng
            .try_fill_bytes(&mut entropy)
            .map_err(|e| TokenError::Rng(e.to_string()))?;

        let plaintext = base32_encode(&entropy);
        let hash = TokenHash::of(&plaintext);

        Ok(Self {
            plaintext,
            hash,
            owner,
            scope,
            expires_at: Utc::now() + lifetime,
        })
    }

    /// Mint a token with the scope's standard lifetime.
    pub fn issue(owner: UserId, scope: TokenScope) -> Result<Self, TokenError> {
        Self::generate(owner, scope, scope.lifetime())
    }

    /// The plaintext, for the issuance response or outbound notification only.
    pub fn plaintext(&self) -> &str {
        &self.plaintext
    }

    /// Whether this token authorizes `scope` at instant `now`.
    pub fn is_valid_for(&self, scope: TokenScope, now: DateTime<Utc>) -> bool {
        self.scope == scope && now < self.expires_at
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"[REDACTED]")
            .field("hash", &self.hash)
            .field("owner", &self.owner)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Whether `candidate` has the shape of a plaintext token.
///
/// Counts characters, not bytes, so multi-byte input of the right byte
/// length is still rejected.
pub fn is_well_formed(candidate: &str) -> bool {
    candidate.chars().count() == TOKEN_LENGTH
}

/// Encode bytes with the RFC 4648 base32 alphabet, no padding.
fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8 + 4) / 5);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32_ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32_ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }

    out
}
