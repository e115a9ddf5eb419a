//! Permission grants via the `permissions` and `users_permissions` tables.

use async_trait::async_trait;
use moviescreen_core::{Permissions, StoreError, UserId};
use sqlx::PgPool;

use super::with_deadline;
use crate::store::PermissionSource;

pub struct PgPermissions {
    pool: PgPool,
}

impl PgPermissions {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PermissionSource for PgPermissions {
    async fn all_codes_for_owner(&self, owner: UserId) -> Result<Permissions, StoreError> {
        let codes: Vec<String> = with_deadline(
            sqlx::query_scalar(
                "SELECT permissions.code
                 FROM permissions
                 INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id
                 WHERE users_permissions.user_id = $1",
            )
            .bind(owner.0)
            .fetch_all(&self.pool),
        )
        .await?;

        Ok(codes.into_iter().collect())
    }

    async fn add_for_owner(&self, owner: UserId, codes: &[&str]) -> Result<(), StoreError> {
        let codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        with_deadline(
            sqlx::query(
                "INSERT INTO users_permissions
                 SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2)
                 ON CONFLICT DO NOTHING",
            )
            .bind(owner.0)
            .bind(&codes)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}
