use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::Middleware;
use crate::dispatcher::{Request, Response};

/// Request counters kept with relaxed atomics.
///
/// Metrics collected:
/// - Requests that entered the before chain
/// - Average latency of requests that reached the after chain
/// - Responses with a 5xx status
/// - Authentication failures, reported by [`AuthGuard`](crate::auth::AuthGuard)
#[derive(Default)]
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    completed_count: AtomicUsize,
    total_latency_ns: AtomicU64,
    server_errors: AtomicUsize,
    auth_failures: AtomicUsize,
}

impl MetricsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the total number of requests processed
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Mean latency across completed requests; zero before the first one.
    pub fn average_latency(&self) -> Duration {
        let count = self.completed_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    pub fn server_errors(&self) -> usize {
        self.server_errors.load(Ordering::Relaxed)
    }

    /// Increment the authentication failure counter
    pub fn inc_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn auth_failures(&self) -> usize {
        self.auth_failures.load(Ordering::Relaxed)
    }
}

impl Middleware for MetricsMiddleware {
    fn before(&self, _req: &mut Request, _res: &mut Response) -> bool {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn after(&self, req: &Request, res: &mut Response) {
        let latency = req.received_at.elapsed();
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
        if res.status() >= 500 {
            self.server_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}
