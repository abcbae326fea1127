use crate::session::SessionError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The checker could not reach a decision (backend down, bad data).
    #[error("auth check failed: {0}")]
    Checker(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Decides whether an identity or a token is acceptable.
///
/// An `Err` is treated the same as `Ok(false)` by the guard.
pub trait AuthCheck: Send + Sync {
    fn is_valid(&self, identity: &str) -> Result<bool, AuthError>;
    fn is_token_valid(&self, token: &str) -> Result<bool, AuthError>;
}

/// The principal a request was authenticated as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthContext {
    /// Identity stored in the login session.
    Identity(String),
    /// Raw bearer token from the token header.
    Token(String),
}

impl AuthContext {
    pub fn as_str(&self) -> &str {
        match self {
            AuthContext::Identity(s) | AuthContext::Token(s) => s,
        }
    }

    pub fn is_token(&self) -> bool {
        matches!(self, AuthContext::Token(_))
    }
}

impl fmt::Display for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthContext::Identity(id) => write!(f, "identity:{id}"),
            AuthContext::Token(_) => f.write_str("token"),
        }
    }
}

/// True when every checker accepts. Stops at the first rejection or error.
pub(crate) fn all_pass<F>(checkers: &[Arc<dyn AuthCheck>], check: F) -> bool
where
    F: Fn(&dyn AuthCheck) -> Result<bool, AuthError>,
{
    checkers.iter().all(|c| match check(c.as_ref()) {
        Ok(valid) => valid,
        Err(e) => {
            warn!(error = %e, "auth checker returned an error");
            false
        }
    })
}
