//! # Request Metrics
//!
//! In-process request counters, served as a JSON snapshot at `/debug/vars`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use parking_lot::Mutex;
use serde::Serialize;

/// Shared metrics state. Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct ApiMetrics {
    received: Arc<AtomicU64>,
    sent: Arc<AtomicU64>,
    processing_us: Arc<AtomicU64>,
    status_counts: Arc<Mutex<BTreeMap<u16, u64>>>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests_received: u64,
    pub total_responses_sent: u64,
    pub total_processing_time_us: u64,
    pub total_responses_sent_by_status: BTreeMap<String, u64>,
}

impl ApiMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests_received: self.received.load(Ordering::Relaxed),
            total_responses_sent: self.sent.load(Ordering::Relaxed),
            total_processing_time_us: self.processing_us.load(Ordering::Relaxed),
            total_responses_sent_by_status: self
                .status_counts
                .lock()
                .iter()
                .map(|(status, count)| (status.to_string(), *count))
                .collect(),
        }
    }

    fn record(&self, status: u16, started: Instant) {
        let elapsed = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        self.sent.fetch_add(1, Ordering::Relaxed);
        self.processing_us.fetch_add(elapsed, Ordering::Relaxed);
        *self.status_counts.lock().entry(status).or_insert(0) += 1;
    }
}

/// Middleware that counts requests, responses and processing time.
pub async fn metrics_middleware(
    State(metrics): State<ApiMetrics>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    metrics.received.fetch_add(1, Ordering::Relaxed);

    let response = next.run(request).await;

    metrics.record(response.status().as_u16(), started);
    response
}
