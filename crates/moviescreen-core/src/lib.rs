//! # moviescreen-core — Domain Types
//!
//! Foundational types shared by the API layer and its stores:
//!
//! - [`token`]: opaque bearer tokens, their SHA-256 storage hash, scopes and
//!   lifetimes.
//! - [`identity`]: the request-scoped caller identity (anonymous or account).
//! - [`permission`]: flat permission-code sets.
//! - [`version`]: optimistic-concurrency version counters.
//! - [`movie`], [`user`]: the versioned records the API mutates.
//! - [`filter`]: list query parameters and pagination metadata.
//! - [`validation`]: per-field validation error collection.
//!
//! Nothing in this crate performs I/O. Persistence lives behind the store
//! traits in `moviescreen-api`.

pub mod error;
pub mod filter;
pub mod identity;
pub mod movie;
pub mod password;
pub mod permission;
pub mod token;
pub mod user;
pub mod validation;
pub mod version;

pub use error::StoreError;
pub use filter::{Metadata, MovieQuery};
pub use identity::{Account, Identity};
pub use movie::{Movie, MovieDraft, MovieId, MoviePatch, Runtime};
pub use password::{PasswordError, PasswordHash};
pub use permission::Permissions;
pub use token::{Token, TokenError, TokenHash, TokenScope};
pub use user::{NewUser, User, UserField, UserId};
pub use validation::Validator;
pub use version::{Version, Versioned};
