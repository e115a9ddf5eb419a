//! Token persistence operations on the `tokens` table.
//!
//! Only the SHA-256 hash of a token is written; the plaintext never reaches
//! the database.

use async_trait::async_trait;
use chrono::Utc;
use moviescreen_core::{StoreError, Token, TokenScope, UserId};
use sqlx::PgPool;

use super::with_deadline;
use crate::store::TokenStore;

pub struct PgTokens {
    pool: PgPool,
}

impl PgTokens {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokens {
    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        with_deadline(
            sqlx::query(
                "INSERT INTO tokens (hash, user_id, expires, scope)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&token.hash.as_bytes()[..])
            .bind(token.owner.0)
            .bind(token.expires_at)
            .bind(token.scope.as_str())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn delete_all_for_owner_and_scope(
        &self,
        owner: UserId,
        scope: TokenScope,
    ) -> Result<(), StoreError> {
        let result = with_deadline(
            sqlx::query(
                "DELETE FROM tokens
                 WHERE (user_id = $1 AND scope = $2) OR expires < $3",
            )
            .bind(owner.0)
            .bind(scope.as_str())
            .bind(Utc::now())
            .execute(&self.pool),
        )
        .await?;

        tracing::debug!(
            owner = %owner,
            scope = %scope,
            deleted = result.rows_affected(),
            "tokens purged"
        );
        Ok(())
    }
}
