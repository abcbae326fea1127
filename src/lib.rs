//! # gantry
//!
//! **gantry** is a synchronous HTTP request pipeline: a route table with
//! ordered before/after middleware, one panic-recovery boundary per request,
//! session and bearer-token authentication, one-shot flash messages and
//! cached template rendering.
//!
//! ## Architecture
//!
//! - **[`dispatcher`]** - `Request`, `Response`, the `Dispatcher` and its builder
//! - **[`router`]** - pattern compilation and the last-registration-wins route table
//! - **[`middleware`]** - before/after middleware traits, tracing and metrics
//! - **[`session`]** - `SessionStore` with signed-cookie and in-memory stores
//! - **[`flash`]** - session-backed one-shot error/success messages
//! - **[`auth`]** - `AuthGuard`: session, token and combined protection
//! - **[`render`]** - HTML/JSON/plain responses and the template cache
//! - **[`static_files`]** - asset directory serving
//! - **[`server`]** - `tiny_http` transport with a fixed worker pool
//! - **[`app`]** - ties the pieces together and handles port selection
//! - **[`config`]** / **[`logging`]** - file and environment configuration
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as server (worker)
//!     participant App
//!     participant Dispatcher
//!     participant Before as before-middleware
//!     participant Handler
//!     participant After as after-middleware
//!
//!     Client->>Server: HTTP request
//!     Server->>App: Request / Response
//!     App->>Dispatcher: match_route(method, path)
//!
//!     alt No route
//!         App->>App: asset mounts, catch-all
//!         App->>Dispatcher: serve_not_found
//!         Dispatcher-->>Client: 404
//!     end
//!
//!     Dispatcher->>Before: in registration order
//!     alt A middleware returns false
//!         Before-->>Client: response written by the middleware
//!     end
//!     Dispatcher->>Handler: call(req, res)
//!     Dispatcher->>After: in registration order
//!
//!     alt Anything panics
//!         Dispatcher->>Dispatcher: log panic + backtrace, reset response
//!         Dispatcher-->>Client: 500 (or the error handler's response)
//!     end
//!
//!     Server-->>Client: HTTP response
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use gantry::app::App;
//! use gantry::config::AppConfig;
//! use gantry::dispatcher::{Dispatcher, Request, Response};
//! use http::Method;
//!
//! fn main() -> anyhow::Result<()> {
//!     let dispatcher = Dispatcher::builder()
//!         .route("/hello/{name}", &[Method::GET], |req: &mut Request, res: &mut Response| {
//!             let name = req.path_param("name").unwrap_or("world");
//!             res.write_str(&format!("Hello, {name}!"));
//!         })
//!         .build()?;
//!     App::new(AppConfig::default(), dispatcher).port(8080).run()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! Each request is handled start to finish on one worker thread. Route
//! table, middleware lists and configuration are built before serving and
//! only read afterwards; the template cache and the in-memory session store
//! are the only shared mutable state, each behind its own lock.

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod flash;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod render;
pub mod router;
pub mod server;
pub mod session;
pub mod static_files;

pub use app::App;
pub use auth::{AuthCheck, AuthContext, AuthGuard};
pub use config::AppConfig;
pub use dispatcher::{Dispatcher, Handler, Request, Response};
pub use flash::Flasher;
pub use ids::RequestId;
pub use render::Renderer;
pub use server::{HttpServer, ServeError, ServerHandle};
pub use session::{CookieStore, MemoryStore, Session, SessionStore};
