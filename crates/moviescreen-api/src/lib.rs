//! # moviescreen-api — Movie Catalog JSON API
//!
//! Axum service over the `moviescreen-core` domain types. Callers present
//! scoped bearer tokens, pass permission gates, are rate limited per IP, and
//! update movies through version-checked writes.
//!
//! ## API Surface
//!
//! | Prefix                  | Module                 | Gate                          |
//! |-------------------------|------------------------|-------------------------------|
//! | `/v1/healthcheck`       | [`routes::health`]     | public                        |
//! | `/debug/vars`           | [`routes::health`]     | activated + `metrics:view`    |
//! | `/v1/movies*`           | [`routes::movies`]     | activated + `movies:read`/`write` |
//! | `/v1/users*`            | [`routes::users`]      | public                        |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → Metrics → CORS → BodyLimit → RateLimit → Authenticate
//!     → [ActivationGate → PermissionGate] → Handler
//! ```
//!
//! The bracketed gates are per-route `route_layer`s. Any stage may answer
//! the request itself.
//!
//! ## Storage
//!
//! Handlers talk to the store traits in [`store`]. With a database DSN the
//! Postgres implementations in [`db`] back them; otherwise everything lives
//! in [`store::memory::MemoryStore`].

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod mailer;
pub mod middleware;
pub mod mutation;
pub mod permissions;
pub mod routes;
pub mod state;
pub mod store;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::Config;
use crate::middleware::metrics::metrics_middleware;
use crate::middleware::rate_limit::rate_limit_middleware;
use crate::middleware::tracing_layer;

pub use error::AppError;
pub use state::AppState;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1_048_576;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::health::router(&state))
        .merge(routes::movies::router(&state))
        .merge(routes::users::router())
        .fallback(not_found)
        .layer(from_fn_with_state(
            state.repos.users.clone(),
            auth::authenticate,
        ))
        .layer(from_fn_with_state(
            state.limiter.clone(),
            rate_limit_middleware,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors(&state.config))
        .layer(from_fn_with_state(state.metrics.clone(), metrics_middleware))
        .layer(tracing_layer::layer())
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::NotFound
}

/// CORS for browser clients. With no trusted origins configured every
/// origin is allowed.
fn cors(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(routes::movies::EXPECTED_VERSION_HEADER),
        ]);

    if config.cors_trusted_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_trusted_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::MailDispatcher;
    use crate::store::Repositories;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn test_app(config: Config) -> Router {
        let (mail, _queue) = MailDispatcher::channel(8);
        app(AppState::new(config, Repositories::in_memory(), mail))
    }

    fn request(method: Method, uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
    }

    #[tokio::test]
    async fn healthcheck_is_public() {
        let response = test_app(Config::default())
            .oneshot(request(Method::GET, "/v1/healthcheck").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get_all(header::VARY)
            .iter()
            .any(|v| v == "Authorization"));

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "available");
        assert_eq!(body["environment"], "development");
        assert_eq!(body["version"], "1.0.0");
    }

    #[tokio::test]
    async fn healthcheck_reports_release_part_of_version_tag() {
        let config = Config {
            version_tag: "2.3.1-4-gdeadbee".into(),
            ..Config::default()
        };
        let response = test_app(config)
            .oneshot(request(Method::GET, "/v1/healthcheck").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["version"], "2.3.1");
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let response = test_app(Config::default())
            .oneshot(request(Method::GET, "/v1/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["type"], "generic");
        assert_eq!(body["data"]["message"], "resource not found");
    }

    #[tokio::test]
    async fn debug_vars_requires_an_account() {
        let response = test_app(Config::default())
            .oneshot(request(Method::GET, "/debug/vars").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let body = format!(r#"{{"email":"{}@example.com"}}"#, "a".repeat(MAX_BODY_BYTES));
        let response = test_app(Config::default())
            .oneshot(
                request(Method::POST, "/v1/users/password-reset-token")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
        assert_ne!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn trusted_origin_is_echoed() {
        let config = Config {
            cors_trusted_origins: vec!["https://moviescreen.example".into()],
            ..Config::default()
        };
        let response = test_app(config)
            .oneshot(
                request(Method::GET, "/v1/healthcheck")
                    .header(header::ORIGIN, "https://moviescreen.example")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://moviescreen.example"
        );
    }
}
