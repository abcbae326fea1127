use super::request::Request;
use super::response::Response;
use crate::middleware::{AfterFn, BeforeFn, Middleware};
use crate::router::{RouteError, RouteMatch, Router};
use http::Method;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Once};
use tracing::{debug, error, info, warn};

/// Body sent when a request panics and no error handler is registered.
pub const INTERNAL_ERROR_BODY: &str = "500 - Internal Server Error.";
/// Body sent when no route matches and no not-found handler is registered.
pub const NOT_FOUND_BODY: &str = "404 - Route not found.";

/// A request handler. Side effects go through the response sink.
pub trait Handler: Send + Sync {
    fn call(&self, req: &mut Request, res: &mut Response);
}

impl<F> Handler for F
where
    F: Fn(&mut Request, &mut Response) + Send + Sync,
{
    fn call(&self, req: &mut Request, res: &mut Response) {
        self(req, res)
    }
}

/// Route table plus the global middleware chains and fallback handlers.
///
/// Built once through [`DispatcherBuilder`] and then shared read-only across
/// worker threads; nothing here changes while requests are being served.
pub struct Dispatcher {
    router: Router,
    before: Vec<Arc<dyn Middleware>>,
    after: Vec<Arc<dyn Middleware>>,
    error_handler: Option<Arc<dyn Handler>>,
    not_found_handler: Option<Arc<dyn Handler>>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.router.find(method, path)
    }

    /// Run the matched route, or the not-found path when nothing matches.
    /// Returns whether a route matched.
    pub fn dispatch(&self, req: &mut Request, res: &mut Response) -> bool {
        match self.match_route(&req.method, &req.path) {
            Some(route) => {
                self.run_route(route, req, res);
                true
            }
            None => {
                self.serve_not_found(req, res);
                false
            }
        }
    }

    /// Run before-middleware, the handler and after-middleware inside one
    /// recovery boundary.
    pub fn run_route(&self, route: RouteMatch, req: &mut Request, res: &mut Response) {
        req.path_params = route.path_params;
        req.route_pattern = Some(Arc::clone(&route.pattern));
        let handler = route.handler;

        let outcome = catch_with_trace(|| self.run_chain(handler.as_ref(), req, res));

        if let Err(caught) = outcome {
            self.recover(caught, req, res);
        }
    }

    fn run_chain(&self, handler: &dyn Handler, req: &mut Request, res: &mut Response) {
        info!(
            request_id = %req.request_id,
            method = %req.method,
            route = req.route_pattern.as_deref().unwrap_or(""),
            path = %req.path,
            "route invoked"
        );

        for (idx, mw) in self.before.iter().enumerate() {
            if !mw.before(req, res) {
                debug!(
                    request_id = %req.request_id,
                    middleware_idx = idx,
                    status = res.status(),
                    "before middleware stopped the request"
                );
                return;
            }
        }

        handler.call(req, res);

        for mw in &self.after {
            mw.after(req, res);
        }
    }

    fn recover(&self, caught: CaughtPanic, req: &mut Request, res: &mut Response) {
        error!(
            request_id = %req.request_id,
            route = req.route_pattern.as_deref().unwrap_or(""),
            path = %req.uri,
            path_params = ?req.path_params,
            panic_message = %panic_message(caught.payload.as_ref()),
            backtrace = %caught.backtrace_text(),
            "request panicked"
        );

        res.reset();
        match &self.error_handler {
            Some(handler) => {
                let handler = Arc::clone(handler);
                let nested = catch_with_trace(|| handler.call(req, res));
                if let Err(caught) = nested {
                    error!(
                        request_id = %req.request_id,
                        panic_message = %panic_message(caught.payload.as_ref()),
                        backtrace = %caught.backtrace_text(),
                        "error handler panicked"
                    );
                    res.reset();
                    write_internal_error(res);
                }
            }
            None => write_internal_error(res),
        }
    }

    /// Answer a request no route matched. The status is fixed at 404 before
    /// any custom handler runs.
    pub fn serve_not_found(&self, req: &mut Request, res: &mut Response) {
        res.set_status(404);
        match &self.not_found_handler {
            Some(handler) => {
                let handler = Arc::clone(handler);
                if let Err(caught) = catch_with_trace(|| handler.call(req, res)) {
                    warn!(
                        request_id = %req.request_id,
                        path = %req.path,
                        panic_message = %panic_message(caught.payload.as_ref()),
                        "not-found handler panicked"
                    );
                }
            }
            None => {
                res.set_header("content-type", "text/plain; charset=utf-8");
                res.write_str(NOT_FOUND_BODY);
            }
        }
    }
}

thread_local! {
    /// Depth of `catch_with_trace` calls on this thread.
    static CATCH_DEPTH: Cell<u32> = const { Cell::new(0) };
    /// Backtrace taken by the panic hook, still holding the panicking frames.
    static PANIC_TRACE: RefCell<Option<Backtrace>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a hook in front of the current one that records a backtrace for
/// panics raised inside `catch_with_trace`. Other panics go straight to the
/// previous hook.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if CATCH_DEPTH.with(Cell::get) > 0 {
                PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(Backtrace::force_capture()));
            } else {
                previous(info);
            }
        }));
    });
}

pub(crate) struct CaughtPanic {
    pub(crate) payload: Box<dyn Any + Send>,
    backtrace: Option<Backtrace>,
}

impl CaughtPanic {
    pub(crate) fn message(&self) -> String {
        panic_message(self.payload.as_ref())
    }

    pub(crate) fn backtrace_text(&self) -> String {
        self.backtrace
            .as_ref()
            .map_or_else(|| "unavailable".to_string(), ToString::to_string)
    }
}

/// `catch_unwind` that also returns the backtrace of the panic site.
///
/// The trace is captured by the panic hook while the failing frames are
/// still on the stack, before unwinding reaches this function.
pub(crate) fn catch_with_trace<R>(f: impl FnOnce() -> R) -> Result<R, CaughtPanic> {
    install_panic_hook();
    CATCH_DEPTH.with(|d| d.set(d.get() + 1));
    let outcome = catch_unwind(AssertUnwindSafe(f));
    CATCH_DEPTH.with(|d| d.set(d.get().saturating_sub(1)));
    outcome.map_err(|payload| CaughtPanic {
        payload,
        backtrace: PANIC_TRACE.with(|slot| slot.borrow_mut().take()),
    })
}

pub(crate) fn write_internal_error(res: &mut Response) {
    res.set_status(500);
    res.set_header("content-type", "text/plain; charset=utf-8");
    res.set_header("x-content-type-options", "nosniff");
    res.write_str(INTERNAL_ERROR_BODY);
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Setup-time configuration for a [`Dispatcher`].
///
/// Route patterns are compiled as they are added; the first bad pattern is
/// reported by [`build`](DispatcherBuilder::build).
#[derive(Default)]
pub struct DispatcherBuilder {
    router: Router,
    before: Vec<Arc<dyn Middleware>>,
    after: Vec<Arc<dyn Middleware>>,
    error_handler: Option<Arc<dyn Handler>>,
    not_found_handler: Option<Arc<dyn Handler>>,
    error: Option<RouteError>,
}

impl DispatcherBuilder {
    pub fn register_before<F>(mut self, mw: F) -> Self
    where
        F: Fn(&mut Request, &mut Response) -> bool + Send + Sync + 'static,
    {
        self.before.push(Arc::new(BeforeFn(mw)));
        self
    }

    pub fn register_after<F>(mut self, mw: F) -> Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.after.push(Arc::new(AfterFn(mw)));
        self
    }

    /// Add a middleware to both chains.
    pub fn add_middleware(mut self, mw: Arc<dyn Middleware>) -> Self {
        self.before.push(Arc::clone(&mw));
        self.after.push(mw);
        self
    }

    /// Bind `handler` to `pattern` for `methods`; an empty slice answers
    /// every method. Re-registering a pattern and method replaces the
    /// earlier handler.
    pub fn route<H>(mut self, pattern: &str, methods: &[Method], handler: H) -> Self
    where
        H: Handler + 'static,
    {
        self.add_route(pattern, methods, Arc::new(handler), None);
        self
    }

    /// Register `prefix + path` as part of the `prefix` group.
    pub fn sub_route<H>(mut self, prefix: &str, path: &str, methods: &[Method], handler: H) -> Self
    where
        H: Handler + 'static,
    {
        let pattern = format!("{prefix}{path}");
        self.add_route(&pattern, methods, Arc::new(handler), Some(prefix));
        self
    }

    fn add_route(
        &mut self,
        pattern: &str,
        methods: &[Method],
        handler: Arc<dyn Handler>,
        group: Option<&str>,
    ) {
        if let Err(e) = self.router.add(pattern, methods, handler, group) {
            error!(pattern = %pattern, error = %e, "invalid route pattern");
            self.error.get_or_insert(e);
        }
    }

    pub fn error_handler<H>(mut self, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn not_found_handler<H>(mut self, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        self.not_found_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> Result<Dispatcher, RouteError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        info!(
            routes = self.router.len(),
            before_middleware = self.before.len(),
            after_middleware = self.after.len(),
            "dispatcher built"
        );
        Ok(Dispatcher {
            router: self.router,
            before: self.before,
            after: self.after,
            error_handler: self.error_handler,
            not_found_handler: self.not_found_handler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    #[inline(never)]
    fn detonate_in_handler() {
        panic!("boom");
    }

    #[test]
    fn test_backtrace_taken_at_panic_site() {
        let caught = catch_with_trace(detonate_in_handler).unwrap_err();
        assert_eq!(panic_message(caught.payload.as_ref()), "boom");
        let trace = caught.backtrace_text();
        assert!(trace.contains("detonate_in_handler"), "{trace}");
    }

    #[test]
    fn test_trace_slot_is_drained() {
        assert!(catch_with_trace(|| panic!("first")).is_err());
        assert!(PANIC_TRACE.with(|slot| slot.borrow().is_none()));
        assert_eq!(catch_with_trace(|| 7).ok(), Some(7));
        assert_eq!(CATCH_DEPTH.with(Cell::get), 0);
    }

    #[test]
    fn test_build_reports_bad_pattern() {
        let result = Dispatcher::builder()
            .route("/ok", &[], |_: &mut Request, _: &mut Response| {})
            .route("/bad/{id:[}", &[], |_: &mut Request, _: &mut Response| {})
            .build();
        assert!(result.is_err());
    }
}
