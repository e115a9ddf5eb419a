//! # Per-Client Rate Limiting
//!
//! Token-bucket rate limiter keyed by the client's IP address. Each client
//! starts with a full bucket of `burst` tokens that refills continuously at
//! `rate_per_second`; a request spends one token or is rejected with 429.
//! Requests never wait for tokens.
//!
//! Idle clients are evicted by a background sweeper started with
//! [`RateLimiter::spawn_sweeper`] and stopped through the server's shutdown
//! channel.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::AppError;

/// Longest sweep period a limiter runs with.
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// When false the middleware passes every request through.
    pub enabled: bool,
    /// Sustained refill rate per client.
    pub rate_per_second: f64,
    /// Bucket capacity per client.
    pub burst: u32,
    /// Period between idle-client sweeps.
    pub sweep_interval: Duration,
    /// A client idle for `idle_multiple × sweep_interval` is evicted.
    pub idle_multiple: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_per_second: 2.0,
            burst: 4,
            sweep_interval: Duration::from_secs(60),
            idle_multiple: 3,
        }
    }
}

impl From<&Config> for RateLimitConfig {
    fn from(config: &Config) -> Self {
        Self {
            enabled: config.limiter_enabled,
            rate_per_second: config.limiter_rps,
            burst: config.limiter_burst,
            sweep_interval: config.limiter_sweep_interval(),
            ..Self::default()
        }
    }
}

impl RateLimitConfig {
    pub fn idle_timeout(&self) -> Duration {
        self.sweep_interval.saturating_mul(self.idle_multiple)
    }
}

/// Per-client bucket state.
#[derive(Debug, Clone)]
struct ClientEntry {
    tokens: f64,
    last_refill: Instant,
    last_seen: Instant,
}

impl ClientEntry {
    fn full(burst: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(burst),
            last_refill: now,
            last_seen: now,
        }
    }

    fn try_spend(&mut self, now: Instant, rate: f64, burst: u32) -> bool {
        self.last_seen = now;

        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).min(f64::from(burst));
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Shared rate limiter state. Clones share the same client map.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: Arc<Mutex<HashMap<String, ClientEntry>>>,
}

impl RateLimiter {
    /// The sweep interval is clamped to `1ms..=MAX_SWEEP_INTERVAL`.
    pub fn new(mut config: RateLimitConfig) -> Self {
        config.sweep_interval = config
            .sweep_interval
            .clamp(Duration::from_millis(1), MAX_SWEEP_INTERVAL);
        Self {
            config,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Whether a request from `key` is allowed right now.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    /// Get-or-create the client's bucket and spend a token, in one critical
    /// section.
    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut clients = self.clients.lock();
        let burst = self.config.burst;
        let entry = clients
            .entry(key.to_string())
            .or_insert_with(|| ClientEntry::full(burst, now));
        entry.try_spend(now, self.config.rate_per_second, burst)
    }

    /// Evict clients idle longer than the idle timeout. Returns the number
    /// removed.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    pub fn sweep_at(&self, now: Instant) -> usize {
        let idle_timeout = self.config.idle_timeout();
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= idle_timeout);
        before - clients.len()
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().len()
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval` until `shutdown`
    /// flips to true or its sender is dropped.
    pub fn spawn_sweeper(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let limiter = self.clone();
        let period = self.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.sweep();
                        if removed > 0 {
                            tracing::debug!(
                                removed,
                                remaining = limiter.tracked_clients(),
                                "evicted idle rate-limit clients"
                            );
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("rate-limit sweeper stopped");
        })
    }
}

/// Middleware that enforces per-client rate limits.
///
/// The key is the peer IP from `ConnectInfo<SocketAddr>`; a request without
/// one is an internal error, not an anonymous bucket.
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    if !limiter.config.enabled {
        return next.run(request).await;
    }

    let Some(ConnectInfo(addr)) = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .copied()
    else {
        return AppError::Internal("peer address unavailable for rate limiting".into())
            .into_response();
    };

    let key = addr.ip().to_string();
    if !limiter.check(&key) {
        tracing::warn!(client = %key, "rate limit exceeded");
        return AppError::RateLimited.into_response();
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn limiter(rate: f64, burst: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            rate_per_second: rate,
            burst,
            ..RateLimitConfig::default()
        })
    }

    #[test]
    fn burst_then_deny() {
        let limiter = limiter(2.0, 4);
        let now = Instant::now();
        let allowed = (0..5).filter(|_| limiter.check_at("10.0.0.1", now)).count();
        assert_eq!(allowed, 4);
    }

    #[test]
    fn distinct_keys_are_independent() {
        let limiter = limiter(2.0, 4);
        let now = Instant::now();
        for _ in 0..5 {
            limiter.check_at("10.0.0.1", now);
        }
        assert!(limiter.check_at("10.0.0.2", now));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn tokens_refill_over_time() {
        let limiter = limiter(2.0, 1);
        let start = Instant::now();
        assert!(limiter.check_at("c", start));
        assert!(!limiter.check_at("c", start));
        assert!(!limiter.check_at("c", start + Duration::from_millis(400)));
        assert!(limiter.check_at("c", start + Duration::from_millis(1000)));
    }

    #[test]
    fn refill_is_capped_at_burst() {
        let limiter = limiter(2.0, 4);
        let start = Instant::now();
        assert!(limiter.check_at("c", start));
        let later = start + Duration::from_secs(3600);
        let allowed = (0..10).filter(|_| limiter.check_at("c", later)).count();
        assert_eq!(allowed, 4);
    }

    #[test]
    fn sweep_evicts_only_idle_clients() {
        let limiter = limiter(2.0, 4);
        let start = Instant::now();
        limiter.check_at("idle", start);
        limiter.check_at("busy", start + Duration::from_secs(170));

        // Idle timeout is 3 × 60s.
        let removed = limiter.sweep_at(start + Duration::from_secs(181));
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn oversized_sweep_interval_is_clamped() {
        let limiter = RateLimiter::new(RateLimitConfig {
            sweep_interval: Duration::MAX,
            idle_multiple: u32::MAX,
            ..RateLimitConfig::default()
        });
        assert_eq!(limiter.config().sweep_interval, MAX_SWEEP_INTERVAL);
        limiter.check("10.0.0.1");
        assert_eq!(limiter.sweep(), 0);

        let unclamped = RateLimitConfig {
            sweep_interval: Duration::MAX,
            ..RateLimitConfig::default()
        };
        assert_eq!(unclamped.idle_timeout(), Duration::MAX);
    }

    #[tokio::test]
    async fn sweeper_with_longest_interval_starts_and_stops() {
        let limiter = RateLimiter::new(RateLimitConfig {
            sweep_interval: Duration::MAX,
            ..RateLimitConfig::default()
        });
        let (tx, rx) = watch::channel(false);
        let handle = limiter.spawn_sweeper(rx);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let limiter = RateLimiter::new(RateLimitConfig {
            sweep_interval: Duration::from_millis(10),
            idle_multiple: 1,
            ..RateLimitConfig::default()
        });
        limiter.check("10.0.0.9");

        let (tx, rx) = watch::channel(false);
        let handle = limiter.spawn_sweeper(rx);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(limiter.tracked_clients(), 0);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    fn app(limiter: RateLimiter) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(
                limiter,
                rate_limit_middleware,
            ))
    }

    fn request_from(ip: [u8; 4]) -> Request {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
        request
    }

    #[tokio::test]
    async fn middleware_returns_429_after_burst() {
        let app = app(limiter(2.0, 4));
        for _ in 0..4 {
            let response = app.clone().oneshot(request_from([127, 0, 0, 1])).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app.clone().oneshot(request_from([127, 0, 0, 1])).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = app.oneshot(request_from([127, 0, 0, 2])).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_peer_address_is_internal_error() {
        let app = app(limiter(2.0, 4));
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn disabled_limiter_passes_everything() {
        let app = app(RateLimiter::new(RateLimitConfig {
            enabled: false,
            burst: 1,
            ..RateLimitConfig::default()
        }));
        for _ in 0..10 {
            let request = Request::builder().uri("/").body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
