use super::core::{
    cache_saved, cookie_header, Session, SessionError, SessionOptions, SessionStore, DEFAULT_MAX_AGE,
};
use crate::dispatcher::{Request, Response};
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Saves between two sweeps of expired sessions.
pub const DEFAULT_PURGE_INTERVAL: u64 = 256;

struct StoredSession {
    values: HashMap<String, Value>,
    max_age: i64,
    expires_at: Option<Instant>,
    last_seen: Instant,
}

impl StoredSession {
    fn expired(&self, now: Instant, idle_timeout: Duration) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
            || now.saturating_duration_since(self.last_seen) >= idle_timeout
    }
}

/// Server-side sessions keyed by a random id in the cookie.
///
/// Values never leave the process; the cookie carries only a ULID. Sessions
/// are lost on restart.
///
/// A session that is not read or saved for `idle_timeout` is dropped even
/// when its `max_age` is zero. Expired entries are swept every
/// `purge_interval` saves.
pub struct MemoryStore {
    sessions: DashMap<String, StoredSession>,
    options: SessionOptions,
    idle_timeout: Duration,
    purge_interval: u64,
    saves: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
            options: SessionOptions::default(),
            idle_timeout: Duration::from_secs(DEFAULT_MAX_AGE as u64),
            purge_interval: DEFAULT_PURGE_INTERVAL,
            saves: AtomicU64::new(0),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Sweep expired sessions every `saves` saves. Zero is treated as one.
    pub fn with_purge_interval(mut self, saves: u64) -> Self {
        self.purge_interval = saves.max(1);
        self
    }

    /// Number of live server-side sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop expired sessions. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, s| !s.expired(now, self.idle_timeout));
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            debug!(removed, remaining = self.sessions.len(), "expired sessions purged");
        }
        removed
    }

    fn note_save(&self) {
        let saves = self.saves.fetch_add(1, Ordering::Relaxed) + 1;
        if saves % self.purge_interval == 0 {
            self.purge_expired();
        }
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, req: &mut Request, name: &str) -> Result<Session, SessionError> {
        if let Some(cached) = req.sessions.get(name) {
            return Ok(cached.clone());
        }

        let mut session = Session::new(name, self.options.clone());
        if let Some(id) = req.cookie(name).map(str::to_string) {
            let now = Instant::now();
            let expired = match self.sessions.get_mut(&id) {
                Some(stored) if stored.expired(now, self.idle_timeout) => true,
                Some(mut stored) => {
                    stored.last_seen = now;
                    session.values = stored.values.clone();
                    if stored.max_age > 0 {
                        session.options.max_age = stored.max_age;
                    }
                    session.id = Some(id.clone());
                    session.is_new = false;
                    false
                }
                None => false,
            };
            if expired {
                self.sessions.remove(&id);
            }
        }

        req.sessions.insert(name.to_string(), session.clone());
        Ok(session)
    }

    fn save(
        &self,
        req: &mut Request,
        res: &mut Response,
        session: &Session,
    ) -> Result<(), SessionError> {
        if let Some(retired) = &session.retired_id {
            self.sessions.remove(retired);
        }

        if session.options.max_age < 0 {
            if let Some(id) = &session.id {
                self.sessions.remove(id);
            }
            res.set_cookie(
                session.name(),
                cookie_header(session.name(), "", &session.options),
            );
            cache_saved(req, session);
            return Ok(());
        }

        let id = session
            .id
            .clone()
            .unwrap_or_else(|| ulid::Ulid::new().to_string());
        let now = Instant::now();
        let expires_at = (session.options.max_age > 0)
            .then(|| now + Duration::from_secs(session.options.max_age as u64));
        self.sessions.insert(
            id.clone(),
            StoredSession {
                values: session.values.clone(),
                max_age: session.options.max_age,
                expires_at,
                last_seen: now,
            },
        );
        res.set_cookie(
            session.name(),
            cookie_header(session.name(), &id, &session.options),
        );

        let mut saved = session.clone();
        saved.id = Some(id);
        cache_saved(req, &saved);
        self.note_save();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn cookie_pair(header: &str) -> String {
        header.split(';').next().unwrap_or_default().to_string()
    }

    #[test]
    fn test_values_stay_server_side() {
        let store = MemoryStore::new();
        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();
        let mut session = store.get(&mut req, "sid").unwrap();
        session.insert("sessid", "bob");
        store.save(&mut req, &mut res, &session).unwrap();

        let pair = cookie_pair(res.cookie("sid").unwrap());
        assert!(!pair.contains("bob"));
        assert_eq!(store.len(), 1);

        let mut next = Request::new(Method::GET, "/").with_header("cookie", &pair);
        assert_eq!(store.get(&mut next, "sid").unwrap().get_str("sessid"), Some("bob"));
    }

    #[test]
    fn test_resave_keeps_id() {
        let store = MemoryStore::new();
        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();
        let session = store.get(&mut req, "sid").unwrap();
        store.save(&mut req, &mut res, &session).unwrap();
        let first = res.cookie("sid").unwrap().to_string();

        let mut again = store.get(&mut req, "sid").unwrap();
        again.insert("n", 2);
        store.save(&mut req, &mut res, &again).unwrap();
        assert_eq!(res.cookie("sid").unwrap(), first);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_expire_removes_server_state() {
        let store = MemoryStore::new();
        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();
        let session = store.get(&mut req, "sid").unwrap();
        store.save(&mut req, &mut res, &session).unwrap();
        assert_eq!(store.len(), 1);

        let mut doomed = store.get(&mut req, "sid").unwrap();
        doomed.options.max_age = -1;
        store.save(&mut req, &mut res, &doomed).unwrap();
        assert!(store.is_empty());
        assert!(res.cookie("sid").unwrap().contains("Max-Age=0"));
    }

    #[test]
    fn test_regenerate_issues_new_id_and_drops_old() {
        let store = MemoryStore::new();
        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();
        let session = store.get(&mut req, "sid").unwrap();
        store.save(&mut req, &mut res, &session).unwrap();
        let planted = cookie_pair(res.cookie("sid").unwrap());

        let mut req = Request::new(Method::POST, "/").with_header("cookie", &planted);
        let mut res = Response::new();
        let mut session = store.get(&mut req, "sid").unwrap();
        assert!(!session.is_new());
        session.insert("sessid", "alice");
        session.regenerate();
        store.save(&mut req, &mut res, &session).unwrap();

        let issued = cookie_pair(res.cookie("sid").unwrap());
        assert_ne!(issued, planted);
        assert_eq!(store.len(), 1);

        let mut stale = Request::new(Method::GET, "/").with_header("cookie", &planted);
        assert!(store.get(&mut stale, "sid").unwrap().is_new());
        let mut fresh = Request::new(Method::GET, "/").with_header("cookie", &issued);
        assert_eq!(store.get(&mut fresh, "sid").unwrap().get_str("sessid"), Some("alice"));
    }

    #[test]
    fn test_abandoned_sessions_are_swept_by_later_saves() {
        let store = MemoryStore::new()
            .with_idle_timeout(Duration::from_millis(200))
            .with_purge_interval(4);

        // A browser-session cookie nobody comes back for.
        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();
        let mut abandoned = store.get(&mut req, "flash").unwrap();
        abandoned.options.max_age = 0;
        abandoned.add_flash("_error", "never read");
        store.save(&mut req, &mut res, &abandoned).unwrap();
        let abandoned_pair = cookie_pair(res.cookie("flash").unwrap());
        std::thread::sleep(Duration::from_millis(250));

        for _ in 0..3 {
            let mut req = Request::new(Method::GET, "/");
            let mut res = Response::new();
            let session = store.get(&mut req, "sid").unwrap();
            store.save(&mut req, &mut res, &session).unwrap();
        }
        assert_eq!(store.len(), 3);

        let mut back = Request::new(Method::GET, "/").with_header("cookie", &abandoned_pair);
        assert!(store.get(&mut back, "flash").unwrap().values.is_empty());
    }

    #[test]
    fn test_reads_keep_a_session_alive() {
        let store = MemoryStore::new().with_idle_timeout(Duration::from_millis(300));
        let mut req = Request::new(Method::GET, "/");
        let mut res = Response::new();
        let mut session = store.get(&mut req, "sid").unwrap();
        session.insert("n", 1);
        store.save(&mut req, &mut res, &session).unwrap();
        let pair = cookie_pair(res.cookie("sid").unwrap());

        for _ in 0..3 {
            std::thread::sleep(Duration::from_millis(150));
            let mut next = Request::new(Method::GET, "/").with_header("cookie", &pair);
            assert!(!store.get(&mut next, "sid").unwrap().is_new());
        }
        assert_eq!(store.purge_expired(), 0);
    }

    #[test]
    fn test_unknown_id_yields_new_session() {
        let store = MemoryStore::new();
        let mut req = Request::new(Method::GET, "/").with_header("cookie", "sid=01ARZ3NDEKTSV4RRFFQ69G5FAV");
        let session = store.get(&mut req, "sid").unwrap();
        assert!(session.is_new());
        assert_eq!(store.purge_expired(), 0);
    }
}
