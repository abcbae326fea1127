//! # Session Module
//!
//! Named, per-user key/value state carried across requests.
//!
//! Two stores ship with the crate:
//!
//! - [`CookieStore`] keeps the values in an HMAC-signed cookie. Nothing is
//!   held server-side and any worker can verify any request.
//! - [`MemoryStore`] keeps the values in process memory and hands the client
//!   only an opaque id. Idle and expired entries are swept as saves come in.
//!
//! Both cache a session on the [`Request`](crate::dispatcher::Request) the
//! first time it is loaded, and refresh that cache on every save, so code
//! that calls `get` twice in one request sees its own earlier writes.
//!
//! Saving with a negative `max_age` deletes the session: the client receives
//! an expired cookie and the rest of the request sees an empty session.

mod cookie;
mod core;
mod memory;

pub use self::cookie::CookieStore;
pub use self::core::{Session, SessionError, SessionOptions, SessionStore, DEFAULT_MAX_AGE};
pub use self::memory::{MemoryStore, DEFAULT_PURGE_INTERVAL};
