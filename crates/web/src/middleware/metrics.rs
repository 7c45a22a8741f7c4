//! Request counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::context::Context;
use crate::handler::Handler;

/// Counts requests, responses by status class, and cumulative handler
/// time. The handle is cheap to clone: register one clone as middleware
/// and keep another to read [`Metrics::snapshot`] from.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    counters: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    requests: AtomicU64,
    success: AtomicU64,
    client_errors: AtomicU64,
    server_errors: AtomicU64,
    elapsed_micros: AtomicU64,
}

/// A point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests: u64,
    pub success: u64,
    pub client_errors: u64,
    pub server_errors: u64,
    pub elapsed_micros: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.counters.requests.load(Ordering::Relaxed),
            success: self.counters.success.load(Ordering::Relaxed),
            client_errors: self.counters.client_errors.load(Ordering::Relaxed),
            server_errors: self.counters.server_errors.load(Ordering::Relaxed),
            elapsed_micros: self.counters.elapsed_micros.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl Handler for Metrics {
    async fn call(&self, ctx: &mut Context) {
        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();

        ctx.next().await;

        let status = ctx.status();
        let bucket = if status.is_server_error() {
            &self.counters.server_errors
        } else if status.is_client_error() {
            &self.counters.client_errors
        } else {
            &self.counters.success
        };
        bucket.fetch_add(1, Ordering::Relaxed);
        self.counters
            .elapsed_micros
            .fetch_add(u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX), Ordering::Relaxed);
    }
}
