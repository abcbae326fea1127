//! # Dispatcher Module
//!
//! Request and response types plus the per-request pipeline that ties route
//! matching, middleware and the recovery boundary together.
//!
//! ## Request Flow
//!
//! 1. The router matches method + path to a registered handler
//! 2. "route invoked" is logged
//! 3. Before-middleware runs in registration order; the first one returning
//!    `false` ends the request (handler and after-middleware are skipped)
//! 4. The handler runs
//! 5. After-middleware runs in registration order
//!
//! Steps 2-5 run inside a single `catch_unwind`. A panic anywhere in them is
//! logged with the route, path and a backtrace, the partial response is
//! discarded and the error handler (or a fixed 500 body) answers instead.
//! The worker thread survives and keeps serving.
//!
//! ```rust
//! use gantry::dispatcher::{Dispatcher, Request, Response};
//! use http::Method;
//!
//! let dispatcher = Dispatcher::builder()
//!     .register_before(|_req: &mut Request, _res: &mut Response| true)
//!     .route("/hello/{name}", &[Method::GET], |req: &mut Request, res: &mut Response| {
//!         let name = req.path_param("name").unwrap_or("world").to_string();
//!         res.write_str(&format!("hello {name}"));
//!     })
//!     .build()
//!     .unwrap();
//!
//! let mut req = Request::new(Method::GET, "/hello/gantry");
//! let mut res = Response::new();
//! dispatcher.dispatch(&mut req, &mut res);
//! assert_eq!(res.body_text(), "hello gantry");
//! ```

mod core;
mod request;
mod response;

pub use self::core::{Dispatcher, DispatcherBuilder, Handler, INTERNAL_ERROR_BODY, NOT_FOUND_BODY};
pub(crate) use self::core::{catch_with_trace, write_internal_error};
pub use request::{parse_cookies, HeaderVec, Request, MAX_INLINE_HEADERS};
pub use response::Response;
