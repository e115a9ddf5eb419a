//! User persistence operations on the `users` table.
//!
//! Username and email uniqueness is enforced by the `users_username_key`
//! and `users_email_key` constraints and surfaced as
//! [`StoreError::DuplicateUsername`] / [`StoreError::DuplicateEmail`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moviescreen_core::{
    NewUser, PasswordHash, StoreError, TokenHash, TokenScope, User, UserId, Version,
};
use sqlx::PgPool;

use super::with_deadline;
use crate::store::{UserStore, VersionedStore};

pub struct PgUsers {
    pool: PgPool,
}

impl PgUsers {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "users.id, users.username, users.email, users.password_hash, users.activated, users.version, users.created_at";

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    activated: bool,
    version: i32,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> User {
        User {
            id: UserId(self.id),
            username: self.username,
            email: self.email,
            password: PasswordHash::from_phc(self.password_hash),
            activated: self.activated,
            version: Version(self.version),
            created_at: self.created_at,
        }
    }
}

#[async_trait]
impl VersionedStore<User> for PgUsers {
    async fn fetch(&self, id: UserId) -> Result<User, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE users.id = $1");
        let row = with_deadline(
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(id.0)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.map(UserRow::into_user).ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &User) -> Result<Version, StoreError> {
        let version: Option<i32> = with_deadline(
            sqlx::query_scalar(
                "UPDATE users
                 SET username = $1, email = $2, password_hash = $3, activated = $4, version = version + 1
                 WHERE id = $5 AND version = $6
                 RETURNING version",
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(user.password.as_phc())
            .bind(user.activated)
            .bind(user.id.0)
            .bind(user.version.0)
            .fetch_optional(&self.pool),
        )
        .await?;

        version.map(Version).ok_or(StoreError::EditConflict)
    }
}

#[async_trait]
impl UserStore for PgUsers {
    async fn register(&self, user: NewUser) -> Result<User, StoreError> {
        let (id, version, created_at): (i64, i32, DateTime<Utc>) = with_deadline(
            sqlx::query_as(
                "INSERT INTO users (username, email, password_hash)
                 VALUES ($1, $2, $3)
                 RETURNING id, version, created_at",
            )
            .bind(&user.username)
            .bind(&user.email)
            .bind(user.password.as_phc())
            .fetch_one(&self.pool),
        )
        .await?;

        let mut stored = user.into_user(UserId(id), created_at);
        stored.version = Version(version);
        Ok(stored)
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE users.email = $1");
        let row = with_deadline(
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(email)
                .fetch_optional(&self.pool),
        )
        .await?;

        row.map(UserRow::into_user).ok_or(StoreError::NotFound)
    }

    async fn get_for_token(
        &self,
        scope: TokenScope,
        hash: &TokenHash,
    ) -> Result<User, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users
             INNER JOIN tokens ON users.id = tokens.user_id
             WHERE tokens.hash = $1 AND tokens.scope = $2 AND tokens.expires > $3"
        );
        let row = with_deadline(
            sqlx::query_as::<_, UserRow>(&sql)
                .bind(&hash.as_bytes()[..])
                .bind(scope.as_str())
                .bind(Utc::now())
                .fetch_optional(&self.pool),
        )
        .await?;

        row.map(UserRow::into_user).ok_or(StoreError::NotFound)
    }
}
