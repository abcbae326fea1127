//! # Router Module
//!
//! Maps a method and path to a registered handler.
//!
//! Patterns use `{name}` for a single path segment and `{name:regex}` for a
//! custom match, e.g. `/users/{id:[0-9]+}/posts/{slug}`. Each pattern is
//! compiled to an anchored regex once at registration; matching walks the
//! table in registration order.
//!
//! Routes are registered at setup time only. The table is read-only while
//! the server is running.

mod core;

pub use self::core::{ParamVec, RouteError, RouteInfo, RouteMatch, Router, MAX_INLINE_PARAMS};
