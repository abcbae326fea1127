//! # Auth Module
//!
//! Session- and token-based authentication for individual routes.
//!
//! An [`AuthGuard`] wraps a handler and only lets it run once the request
//! carries an accepted credential. The accepted principal is attached to the
//! request as an [`AuthContext`] that the handler reads with
//! [`Request::auth_context`](crate::dispatcher::Request::auth_context).
//!
//! ```rust,ignore
//! let guard = AuthGuard::new(flasher, Arc::new(MyChecker), "/login");
//! let builder = builder
//!     .route("/account", &[Method::GET], guard.require_session(account))
//!     .route("/api/me", &[Method::GET], guard.require_token(api_me))
//!     .route("/feed", &[], guard.require_session_or_token(feed));
//! ```
//!
//! Logging in and out goes through the same guard so the session name and
//! identity key stay in one place:
//!
//! ```rust,ignore
//! guard.do_login(req, res, "alice")?;
//! guard.do_logout(req, res)?;
//! ```

mod checker;
mod guard;

pub use self::checker::{AuthCheck, AuthContext, AuthError};
pub use self::guard::{
    AuthGuard, Protected, LOGIN_TTL_SECS, SESSION_AUTH_KEY, SESSION_ID_KEY, TOKEN_HEADER,
};
