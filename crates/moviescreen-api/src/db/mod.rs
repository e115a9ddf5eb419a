//! # Database Persistence Layer
//!
//! Postgres implementations of the store traits via SQLx.
//!
//! The database layer is **optional**. When a DSN is configured the API
//! persists movies, users, tokens and permission grants to PostgreSQL. When
//! absent, the API runs on [`MemoryStore`](crate::store::memory::MemoryStore)
//! and state does not survive restarts.
//!
//! Every query runs under [`QUERY_DEADLINE`]; a query that overruns it is
//! reported as [`StoreError::Timeout`].

pub mod movies;
pub mod permissions;
pub mod tokens;
pub mod users;

use std::future::Future;
use std::time::Duration;

use moviescreen_core::StoreError;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

/// Upper bound on any single store operation.
pub const QUERY_DEADLINE: Duration = Duration::from_secs(3);

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if no DSN is configured (in-memory-only mode).
/// Returns `Err` if the DSN is set but the connection or migration fails.
pub async fn init_pool(config: &Config) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(dsn) = config.db_dsn.as_deref() else {
        tracing::warn!(
            "DATABASE_URL not set; running in-memory only mode. \
             State will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_open_conns)
        .idle_timeout(config.db_max_idle_time())
        .acquire_timeout(Duration::from_secs(5))
        .connect(dsn)
        .await?;

    tracing::info!("connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(Some(pool))
}

/// Run `query` under [`QUERY_DEADLINE`], mapping driver errors.
pub(crate) async fn with_deadline<T, F>(query: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    run_within(QUERY_DEADLINE, query).await
}

async fn run_within<T, F>(deadline: Duration, query: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(deadline, query).await {
        Ok(result) => result.map_err(map_error),
        Err(_) => Err(StoreError::Timeout(deadline)),
    }
}

/// Translate a driver error into the store vocabulary.
pub(crate) fn map_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) => match db.constraint() {
            Some("users_username_key") => StoreError::DuplicateUsername,
            Some("users_email_key") => StoreError::DuplicateEmail,
            _ => StoreError::Backend(err.to_string()),
        },
        _ => StoreError::Backend(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(map_error(sqlx::Error::RowNotFound), StoreError::NotFound));
    }

    #[test]
    fn pool_errors_are_backend_failures() {
        let mapped = map_error(sqlx::Error::PoolTimedOut);
        assert!(matches!(mapped, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn overrunning_query_times_out() {
        let deadline = Duration::from_millis(20);
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, sqlx::Error>(())
        };
        let result = run_within(deadline, slow).await;
        assert!(matches!(result, Err(StoreError::Timeout(d)) if d == deadline));
    }

    #[tokio::test]
    async fn driver_errors_pass_through_mapping() {
        let failing = async { Err::<(), _>(sqlx::Error::RowNotFound) };
        assert!(matches!(with_deadline(failing).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn no_dsn_means_in_memory_mode() {
        let pool = init_pool(&Config::default()).await.unwrap();
        assert!(pool.is_none());
    }
}
