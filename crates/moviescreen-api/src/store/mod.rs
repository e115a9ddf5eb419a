//! # Store Interfaces
//!
//! Collaborator traits the handlers and middleware depend on, plus the
//! [`Repositories`] bundle that wires one implementation of each into
//! [`AppState`](crate::state::AppState).
//!
//! Two implementations exist: Postgres ([`crate::db`]) and in-memory
//! ([`memory::MemoryStore`]). Both report the same [`StoreError`]s, and both
//! delegate update atomicity to a single conditional write keyed on
//! `(id, version)`.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use moviescreen_core::filter::{Metadata, MovieQuery};
use moviescreen_core::{
    Movie, MovieDraft, MovieId, NewUser, Permissions, StoreError, Token, TokenHash, TokenScope,
    User, UserId, Version, Versioned,
};
use sqlx::PgPool;

/// Persistence for scoped tokens. Only hashes are stored.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, token: &Token) -> Result<(), StoreError>;

    /// Delete every token of `owner` in `scope`, and every expired token.
    async fn delete_all_for_owner_and_scope(
        &self,
        owner: UserId,
        scope: TokenScope,
    ) -> Result<(), StoreError>;

    /// Mint a token, supersede the owner's tokens of that scope, persist it.
    async fn new_token(
        &self,
        owner: UserId,
        scope: TokenScope,
        lifetime: Duration,
    ) -> Result<Token, StoreError> {
        let token = Token::generate(owner, scope, lifetime)?;
        self.delete_all_for_owner_and_scope(owner, scope).await?;
        self.insert(&token).await?;
        Ok(token)
    }
}

/// Permission codes granted to accounts.
#[async_trait]
pub trait PermissionSource: Send + Sync {
    /// Every code held by `owner`; empty if none.
    async fn all_codes_for_owner(&self, owner: UserId) -> Result<Permissions, StoreError>;

    /// Grant `codes` to `owner`. Granting a held code is a no-op.
    async fn add_for_owner(&self, owner: UserId, codes: &[&str]) -> Result<(), StoreError>;
}

/// Fetch and conditional update for a versioned record type.
#[async_trait]
pub trait VersionedStore<T: Versioned + 'static>: Send + Sync {
    async fn fetch(&self, id: T::Id) -> Result<T, StoreError>;

    /// Write `entity` only if the stored version still equals
    /// `entity.version()`; returns the new version.
    ///
    /// A version mismatch or a vanished record is [`StoreError::EditConflict`].
    async fn update(&self, entity: &T) -> Result<Version, StoreError>;
}

#[async_trait]
pub trait MovieStore: VersionedStore<Movie> {
    async fn create(&self, draft: MovieDraft) -> Result<Movie, StoreError>;

    /// One page of matching movies plus pagination metadata.
    async fn list(&self, query: &MovieQuery) -> Result<(Vec<Movie>, Metadata), StoreError>;

    /// Delete by id; [`StoreError::NotFound`] if nothing was deleted.
    async fn delete(&self, id: MovieId) -> Result<(), StoreError>;
}

#[async_trait]
pub trait UserStore: VersionedStore<User> {
    /// Insert a new, unactivated account.
    async fn register(&self, user: NewUser) -> Result<User, StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// The owner of a non-expired token with matching scope and hash.
    async fn get_for_token(&self, scope: TokenScope, hash: &TokenHash)
        -> Result<User, StoreError>;
}

/// One implementation of every store, shared across requests.
#[derive(Clone)]
pub struct Repositories {
    pub movies: Arc<dyn MovieStore>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionSource>,
}

impl Repositories {
    /// All stores backed by a single in-process [`memory::MemoryStore`].
    pub fn in_memory() -> Self {
        Self::from_memory(memory::MemoryStore::new())
    }

    pub fn from_memory(store: memory::MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            movies: store.clone(),
            users: store.clone(),
            tokens: store.clone(),
            permissions: store,
        }
    }

    /// All stores backed by Postgres.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            movies: Arc::new(crate::db::movies::PgMovies::new(pool.clone())),
            users: Arc::new(crate::db::users::PgUsers::new(pool.clone())),
            tokens: Arc::new(crate::db::tokens::PgTokens::new(pool.clone())),
            permissions: Arc::new(crate::db::permissions::PgPermissions::new(pool)),
        }
    }
}
