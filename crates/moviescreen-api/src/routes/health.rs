//! # Health and Debug Routes
//!
//! Routes:
//! - GET /v1/healthcheck — availability, environment and version (public)
//! - GET /debug/vars — request counters and limiter size (`metrics:view`)

use axum::extract::State;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::get;
use axum::{Json, Router};
use moviescreen_core::permission::METRICS_VIEW;
use serde::Serialize;

use crate::auth::require_activated_user;
use crate::middleware::metrics::MetricsSnapshot;
use crate::permissions::{require_permission, PermissionGate};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub environment: &'static str,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct DebugVars {
    #[serde(flatten)]
    pub requests: MetricsSnapshot,
    pub rate_limiter_tracked_clients: usize,
}

pub fn router(state: &AppState) -> Router<AppState> {
    let metrics_gate = PermissionGate::new(METRICS_VIEW, state.repos.permissions.clone());

    let debug = Router::new()
        .route("/debug/vars", get(debug_vars))
        .route_layer(from_fn_with_state(metrics_gate, require_permission))
        .route_layer(from_fn(require_activated_user));

    Router::new()
        .route("/v1/healthcheck", get(healthcheck))
        .merge(debug)
}

/// GET /v1/healthcheck
async fn healthcheck(State(state): State<AppState>) -> Json<Health> {
    // Build tags look like `1.2.0-4-gdeadbee`; report the release part.
    let version = state
        .config
        .version_tag
        .split('-')
        .next()
        .unwrap_or_default()
        .to_string();

    Json(Health {
        status: "available",
        environment: state.config.environment().as_str(),
        version,
    })
}

/// GET /debug/vars
async fn debug_vars(State(state): State<AppState>) -> Json<DebugVars> {
    Json(DebugVars {
        requests: state.metrics.snapshot(),
        rate_limiter_tracked_clients: state.limiter.tracked_clients(),
    })
}
