//! # Application State
//!
//! Shared state for the Axum application, passed to route handlers and
//! middleware via the `State` extractor. Every field is cheap to clone:
//! stores sit behind `Arc`, counters and the limiter map are shared
//! handles.

use std::sync::Arc;

use crate::config::Config;
use crate::mailer::MailDispatcher;
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};
use crate::store::Repositories;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub repos: Repositories,
    pub mail: MailDispatcher,
    pub metrics: ApiMetrics,
    pub limiter: RateLimiter,
}

impl AppState {
    /// Build state with fresh metrics and a limiter configured from `config`.
    pub fn new(config: Config, repos: Repositories, mail: MailDispatcher) -> Self {
        let limiter = RateLimiter::new(RateLimitConfig::from(&config));
        Self {
            config: Arc::new(config),
            repos,
            mail,
            metrics: ApiMetrics::new(),
            limiter,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("tracked_clients", &self.limiter.tracked_clients())
            .finish_non_exhaustive()
    }
}
