use crate::dispatcher::{Request, Response};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

/// Thirty days, the default lifetime of a session cookie.
pub const DEFAULT_MAX_AGE: i64 = 86_400 * 30;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session cookie {name:?} could not be decoded")]
    Decode { name: String },
    #[error("session cookie {name:?} has an invalid signature")]
    Signature { name: String },
    #[error("session could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("session store error: {0}")]
    Store(String),
}

/// Cookie attributes for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub path: String,
    /// Seconds until expiry. Zero means a browser-session cookie, a negative
    /// value deletes the session on the next save.
    pub max_age: i64,
    pub http_only: bool,
    pub secure: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            max_age: DEFAULT_MAX_AGE,
            http_only: true,
            secure: false,
        }
    }
}

/// A named bag of values persisted by a [`SessionStore`].
///
/// Mutations are local until [`SessionStore::save`] is called.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    name: String,
    pub(crate) id: Option<String>,
    /// Server-side id to discard on the next save after [`Session::regenerate`].
    pub(crate) retired_id: Option<String>,
    pub values: HashMap<String, Value>,
    pub options: SessionOptions,
    pub(crate) is_new: bool,
}

impl Session {
    pub fn new(name: &str, options: SessionOptions) -> Self {
        Self {
            name: name.to_string(),
            id: None,
            retired_id: None,
            values: HashMap::new(),
            options,
            is_new: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the session was created for this request rather than loaded.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Issue a fresh id on the next save and discard the old one.
    ///
    /// Call this whenever the privilege level changes, such as at login, so
    /// an id the client carried in beforehand stops naming this session.
    /// Stores that keep no server-side id ignore it.
    pub fn regenerate(&mut self) {
        if let Some(old) = self.id.take() {
            self.retired_id = Some(old);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Queue a one-shot message under `key`.
    pub fn add_flash(&mut self, key: &str, message: impl Into<Value>) {
        let entry = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match entry {
            Value::Array(items) => items.push(message.into()),
            other => *other = Value::Array(vec![message.into()]),
        }
    }

    /// Take the messages queued under `key`, oldest first.
    pub fn flashes(&mut self, key: &str) -> Vec<Value> {
        match self.values.remove(key) {
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
            None => Vec::new(),
        }
    }
}

/// Persistence for sessions.
///
/// Implementations cache sessions on the request so that several `get`
/// calls within one request observe each other's saved changes. They must
/// be safe to share across worker threads.
pub trait SessionStore: Send + Sync {
    /// Load the named session, or a fresh one when the request carries none.
    fn get(&self, req: &mut Request, name: &str) -> Result<Session, SessionError>;

    /// Commit `session`, usually by queueing a `Set-Cookie` on `res`.
    fn save(&self, req: &mut Request, res: &mut Response, session: &Session)
        -> Result<(), SessionError>;
}

/// Format a `Set-Cookie` header value.
pub(crate) fn cookie_header(name: &str, value: &str, options: &SessionOptions) -> String {
    let mut header = format!("{name}={value}; Path={}", options.path);
    if options.max_age < 0 {
        header.push_str("; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
    } else if options.max_age > 0 {
        header.push_str(&format!("; Max-Age={}", options.max_age));
    }
    if options.http_only {
        header.push_str("; HttpOnly");
    }
    if options.secure {
        header.push_str("; Secure");
    }
    header.push_str("; SameSite=Lax");
    header
}

/// Record `session` as the current state for the rest of this request.
///
/// An expired session is replaced by an empty one so later reads in the same
/// request see no values.
pub(crate) fn cache_saved(req: &mut Request, session: &Session) {
    let cached = if session.options.max_age < 0 {
        Session::new(session.name(), SessionOptions::default())
    } else {
        let mut s = session.clone();
        s.is_new = false;
        s.retired_id = None;
        s
    };
    req.sessions.insert(session.name().to_string(), cached);
}
