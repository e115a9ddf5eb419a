//! # Movie Catalog Routes
//!
//! Routes:
//! - GET    /v1/movies — filtered, sorted, paginated listing (`movies:read`)
//! - POST   /v1/movies — create (`movies:write`)
//! - GET    /v1/movies/:id — fetch one (`movies:read`)
//! - PATCH  /v1/movies/:id — partial update, version-checked (`movies:write`)
//! - DELETE /v1/movies/:id — delete (`movies:write`)
//!
//! Every route requires an activated account. Reads and writes sit behind
//! separate permission gates.
//!
//! A PATCH may carry `X-Expected-Version`; if the stored version differs
//! the update is refused with 409 before anything is written.

use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::{Json, Router};
use moviescreen_core::filter::{Metadata, MovieQuery};
use moviescreen_core::permission::{MOVIES_READ, MOVIES_WRITE};
use moviescreen_core::{Movie, MovieDraft, MovieId, MoviePatch, Validator, Version};
use serde::Serialize;

use super::Message;
use crate::auth::require_activated_user;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::mutation::mutate;
use crate::permissions::{require_permission, PermissionGate};
use crate::state::AppState;

/// Header carrying the version a client last observed.
pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

impl Validate for MoviePatch {
    fn validate(&self) -> Result<(), Validator> {
        MoviePatch::validate(self)
    }
}

#[derive(Debug, Serialize)]
pub struct MovieList {
    pub movies: Vec<Movie>,
    pub metadata: Metadata,
}

pub fn router(state: &AppState) -> Router<AppState> {
    let permissions = state.repos.permissions.clone();

    let reads = Router::new()
        .route("/v1/movies", get(list_movies))
        .route("/v1/movies/:id", get(show_movie))
        .route_layer(from_fn_with_state(
            PermissionGate::new(MOVIES_READ, permissions.clone()),
            require_permission,
        ));

    let writes = Router::new()
        .route("/v1/movies", axum::routing::post(create_movie))
        .route(
            "/v1/movies/:id",
            axum::routing::patch(update_movie).delete(delete_movie),
        )
        .route_layer(from_fn_with_state(
            PermissionGate::new(MOVIES_WRITE, permissions),
            require_permission,
        ));

    reads
        .merge(writes)
        .route_layer(from_fn(require_activated_user))
}

/// Ids are positive integers; anything else names no movie.
fn parse_id(raw: &str) -> Result<MovieId, AppError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id >= 1)
        .map(MovieId)
        .ok_or(AppError::NotFound)
}

fn expected_version(headers: &HeaderMap) -> Result<Option<Version>, AppError> {
    let Some(value) = headers.get(EXPECTED_VERSION_HEADER) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.parse::<Version>().ok())
        .map(Some)
        .ok_or_else(|| {
            AppError::BadRequest("X-Expected-Version must be an integer version".into())
        })
}

/// GET /v1/movies
async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<MovieList>, AppError> {
    let query = MovieQuery::from_params(&params)?;
    let (movies, metadata) = state.repos.movies.list(&query).await?;
    Ok(Json(MovieList { movies, metadata }))
}

/// POST /v1/movies
async fn create_movie(
    State(state): State<AppState>,
    body: Result<Json<MoviePatch>, JsonRejection>,
) -> Result<(StatusCode, [(header::HeaderName, String); 1], Json<Movie>), AppError> {
    let draft = MovieDraft::try_from(extract_json(body)?)?;
    let movie = state.repos.movies.create(draft).await?;
    tracing::info!(movie_id = %movie.id, "movie created");

    let location = format!("/v1/movies/{}", movie.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(movie)))
}

/// GET /v1/movies/:id
async fn show_movie(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Movie>, AppError> {
    let id = parse_id(&raw_id)?;
    Ok(Json(state.repos.movies.fetch(id).await?))
}

/// PATCH /v1/movies/:id
async fn update_movie(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<MoviePatch>, JsonRejection>,
) -> Result<Json<Movie>, AppError> {
    let id = parse_id(&raw_id)?;
    let observed = expected_version(&headers)?;
    let patch = extract_validated_json(body)?;

    let movie = mutate(&*state.repos.movies, id, observed, |movie: &mut Movie| {
        patch.apply(movie)
    })
    .await?;
    tracing::info!(movie_id = %movie.id, version = %movie.version, "movie updated");
    Ok(Json(movie))
}

/// DELETE /v1/movies/:id
async fn delete_movie(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Message>, AppError> {
    let id = parse_id(&raw_id)?;
    state.repos.movies.delete(id).await?;
    tracing::info!(movie_id = %id, "movie deleted");
    Ok(Json(Message::new("movie deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn ids_must_be_positive_integers() {
        assert_eq!(parse_id("42").unwrap(), MovieId(42));
        assert!(matches!(parse_id("0"), Err(AppError::NotFound)));
        assert!(matches!(parse_id("-3"), Err(AppError::NotFound)));
        assert!(matches!(parse_id("abc"), Err(AppError::NotFound)));
    }

    #[test]
    fn expected_version_header_is_optional() {
        assert_eq!(expected_version(&HeaderMap::new()).unwrap(), None);

        let mut headers = HeaderMap::new();
        headers.insert(EXPECTED_VERSION_HEADER, HeaderValue::from_static(" 3 "));
        assert_eq!(expected_version(&headers).unwrap(), Some(Version(3)));

        headers.insert(EXPECTED_VERSION_HEADER, HeaderValue::from_static("three"));
        assert!(matches!(
            expected_version(&headers),
            Err(AppError::BadRequest(_))
        ));
    }
}
