use tracing::{field, info, info_span, Span};

use super::Middleware;
use crate::dispatcher::{Request, Response};

/// Opens a `request` span in `before` and closes it out in `after`.
///
/// The span is carried in the request's extensions rather than entered on
/// the worker thread, so a request that stops early or panics leaves no
/// span behind.
pub struct TracingMiddleware;

#[derive(Clone)]
struct RequestSpan(Span);

impl Middleware for TracingMiddleware {
    fn before(&self, req: &mut Request, _res: &mut Response) -> bool {
        let span = info_span!(
            "request",
            request_id = %req.request_id,
            method = %req.method,
            path = %req.path,
            route = req.route_pattern.as_deref().unwrap_or(""),
            status = field::Empty,
            latency_ms = field::Empty,
        );
        req.extensions.insert(RequestSpan(span));
        true
    }

    fn after(&self, req: &Request, res: &mut Response) {
        let latency_ms = req.received_at.elapsed().as_millis() as u64;
        if let Some(RequestSpan(span)) = req.extensions.get::<RequestSpan>() {
            span.record("status", res.status());
            span.record("latency_ms", latency_ms);
            span.in_scope(|| info!(status = res.status(), latency_ms, "request completed"));
        }
    }
}
