//! Movie persistence operations on the `movies` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moviescreen_core::filter::{Metadata, MovieQuery};
use moviescreen_core::{Movie, MovieDraft, MovieId, Runtime, StoreError, Version};
use sqlx::PgPool;

use super::with_deadline;
use crate::store::{MovieStore, VersionedStore};

pub struct PgMovies {
    pool: PgPool,
}

impl PgMovies {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct MovieRow {
    id: i64,
    title: String,
    year: i32,
    runtime: i32,
    genres: Vec<String>,
    version: i32,
    created_at: DateTime<Utc>,
}

impl MovieRow {
    fn into_movie(self) -> Movie {
        Movie {
            id: MovieId(self.id),
            title: self.title,
            year: self.year,
            runtime: Runtime(self.runtime),
            genres: self.genres,
            version: Version(self.version),
            created_at: self.created_at,
        }
    }
}

/// A listed row carries the window count of all matches.
#[derive(sqlx::FromRow)]
struct ListedRow {
    total: i64,
    #[sqlx(flatten)]
    movie: MovieRow,
}

#[async_trait]
impl VersionedStore<Movie> for PgMovies {
    async fn fetch(&self, id: MovieId) -> Result<Movie, StoreError> {
        let row = with_deadline(
            sqlx::query_as::<_, MovieRow>(
                "SELECT id, title, year, runtime, genres, version, created_at
                 FROM movies WHERE id = $1",
            )
            .bind(id.0)
            .fetch_optional(&self.pool),
        )
        .await?;

        row.map(MovieRow::into_movie).ok_or(StoreError::NotFound)
    }

    async fn update(&self, movie: &Movie) -> Result<Version, StoreError> {
        let version: Option<i32> = with_deadline(
            sqlx::query_scalar(
                "UPDATE movies
                 SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1
                 WHERE id = $5 AND version = $6
                 RETURNING version",
            )
            .bind(&movie.title)
            .bind(movie.year)
            .bind(movie.runtime.0)
            .bind(&movie.genres)
            .bind(movie.id.0)
            .bind(movie.version.0)
            .fetch_optional(&self.pool),
        )
        .await?;

        version.map(Version).ok_or(StoreError::EditConflict)
    }
}

#[async_trait]
impl MovieStore for PgMovies {
    async fn create(&self, draft: MovieDraft) -> Result<Movie, StoreError> {
        let (id, version, created_at): (i64, i32, DateTime<Utc>) = with_deadline(
            sqlx::query_as(
                "INSERT INTO movies (title, year, runtime, genres)
                 VALUES ($1, $2, $3, $4)
                 RETURNING id, version, created_at",
            )
            .bind(&draft.title)
            .bind(draft.year)
            .bind(draft.runtime.0)
            .bind(&draft.genres)
            .fetch_one(&self.pool),
        )
        .await?;

        let mut movie = draft.into_movie(MovieId(id), created_at);
        movie.version = Version(version);
        Ok(movie)
    }

    async fn list(&self, query: &MovieQuery) -> Result<(Vec<Movie>, Metadata), StoreError> {
        // Sort column and direction come from a closed safelist.
        let sql = format!(
            "SELECT count(*) OVER() AS total, id, title, year, runtime, genres, version, created_at
             FROM movies
             WHERE (to_tsvector('simple', title) @@ plainto_tsquery('simple', $1) OR $1 = '')
             AND (genres @> $2 OR $2 = '{{}}')
             ORDER BY {} {}, id ASC
             LIMIT $3 OFFSET $4",
            query.sort.column.as_sql(),
            query.sort.direction.as_sql(),
        );

        let rows = with_deadline(
            sqlx::query_as::<_, ListedRow>(&sql)
                .bind(&query.title)
                .bind(&query.genres)
                .bind(query.limit)
                .bind(query.offset())
                .fetch_all(&self.pool),
        )
        .await?;

        let total = rows.first().map_or(0, |r| r.total);
        let movies = rows.into_iter().map(|r| r.movie.into_movie()).collect();
        Ok((movies, Metadata::calculate(query.page, query.limit, total)))
    }

    async fn delete(&self, id: MovieId) -> Result<(), StoreError> {
        let result = with_deadline(
            sqlx::query("DELETE FROM movies WHERE id = $1")
                .bind(id.0)
                .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
