use super::checker::{all_pass, AuthCheck, AuthContext};
use crate::dispatcher::{Handler, Request, Response};
use crate::flash::Flasher;
use crate::middleware::MetricsMiddleware;
use crate::session::{SessionError, SessionStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Session that holds the logged-in identity.
pub const SESSION_AUTH_KEY: &str = "sessauthkey";
/// Key of the identity inside the auth session.
pub const SESSION_ID_KEY: &str = "sessid";
pub const TOKEN_HEADER: &str = "X-User-Token";
/// Lifetime of the auth session after a login, in seconds.
pub const LOGIN_TTL_SECS: i64 = 60 * 60 * 2;

const TOKEN_MISSING_BODY: &str = "Authorization required.";
const TOKEN_INVALID_BODY: &str = "Unauthorized.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Session,
    Token,
    SessionOrToken,
}

/// Wraps handlers so they only run for authenticated requests.
///
/// Three variants share one validation policy: every checker in the list
/// must accept, evaluated in order and stopping at the first rejection.
///
/// | variant                    | no credential           | rejected credential     |
/// |----------------------------|-------------------------|-------------------------|
/// | `require_session`          | flash + 303 to login    | flash + 303 to login    |
/// | `require_token`            | 403                     | 401                     |
/// | `require_session_or_token` | flash + 303 to login    | token: 401, session: flash + 303 |
///
/// In the combined variant a token, when present, takes precedence over
/// the session.
#[derive(Clone)]
pub struct AuthGuard {
    flasher: Flasher,
    checker: Arc<dyn AuthCheck>,
    login_url: Arc<str>,
    auth_key: Arc<str>,
    token_header: Arc<str>,
    metrics: Option<Arc<MetricsMiddleware>>,
}

impl AuthGuard {
    pub fn new(flasher: Flasher, checker: Arc<dyn AuthCheck>, login_url: &str) -> Self {
        Self::custom(flasher, checker, login_url, SESSION_AUTH_KEY, TOKEN_HEADER)
    }

    /// Like [`new`](Self::new) with a custom auth session name and token header.
    pub fn custom(
        flasher: Flasher,
        checker: Arc<dyn AuthCheck>,
        login_url: &str,
        auth_key: &str,
        token_header: &str,
    ) -> Self {
        Self {
            flasher,
            checker,
            login_url: Arc::from(login_url),
            auth_key: Arc::from(auth_key),
            token_header: Arc::from(token_header),
            metrics: None,
        }
    }

    /// Count rejected requests on `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsMiddleware>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    pub fn require_session<H: Handler + 'static>(&self, handler: H) -> Protected {
        self.protect(Mode::Session, handler)
    }

    pub fn require_token<H: Handler + 'static>(&self, handler: H) -> Protected {
        self.protect(Mode::Token, handler)
    }

    pub fn require_session_or_token<H: Handler + 'static>(&self, handler: H) -> Protected {
        self.protect(Mode::SessionOrToken, handler)
    }

    fn protect<H: Handler + 'static>(&self, mode: Mode, handler: H) -> Protected {
        Protected {
            guard: self.clone(),
            mode,
            checkers: Vec::new(),
            handler: Arc::new(handler),
        }
    }

    /// Store `identity` in the auth session and extend it to two hours.
    ///
    /// The session id is rotated, so an id planted before login never
    /// becomes an authenticated one.
    pub fn do_login(
        &self,
        req: &mut Request,
        res: &mut Response,
        identity: &str,
    ) -> Result<(), SessionError> {
        let store = self.flasher.store();
        let mut session = store.get(req, &self.auth_key)?;
        session.regenerate();
        session.insert(SESSION_ID_KEY, identity);
        session.options.max_age = LOGIN_TTL_SECS;
        store.save(req, res, &session)
    }

    /// Expire the auth session. Safe to call when nobody is logged in.
    pub fn do_logout(&self, req: &mut Request, res: &mut Response) -> Result<(), SessionError> {
        let store = self.flasher.store();
        let mut session = store.get(req, &self.auth_key)?;
        session.options.max_age = -1;
        store.save(req, res, &session)
    }

    /// Identity in the auth session, without running any checker.
    pub fn session_identity(&self, req: &mut Request) -> Option<String> {
        self.flasher
            .store()
            .get(req, &self.auth_key)
            .ok()
            .and_then(|s| s.get_str(SESSION_ID_KEY).map(str::to_string))
    }

    fn note_failure(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.inc_auth_failure();
        }
    }

    fn redirect_to_login(&self, req: &mut Request, res: &mut Response, message: &str) {
        self.note_failure();
        debug!(
            request_id = %req.request_id,
            path = %req.path,
            login_url = %self.login_url,
            "unauthenticated request redirected to login"
        );
        self.flasher.set_error_flash(req, res, message);
        res.redirect(req, &self.login_url, 303);
    }

    fn reject(&self, req: &Request, res: &mut Response, status: u16, body: &str) {
        self.note_failure();
        debug!(request_id = %req.request_id, path = %req.path, status, "request rejected");
        res.set_status(status);
        res.set_header("content-type", "text/plain; charset=utf-8");
        res.write_str(body);
    }
}

fn requires_auth_message(req: &Request) -> String {
    format!("{} requires authentication.", req.uri)
}

/// A handler behind an [`AuthGuard`].
pub struct Protected {
    guard: AuthGuard,
    mode: Mode,
    checkers: Vec<Arc<dyn AuthCheck>>,
    handler: Arc<dyn Handler>,
}

impl Protected {
    /// Validate with `checkers` instead of the guard's default checker.
    /// An empty list keeps the default.
    pub fn with_checkers(mut self, checkers: Vec<Arc<dyn AuthCheck>>) -> Self {
        self.checkers = checkers;
        self
    }

    fn checkers(&self) -> &[Arc<dyn AuthCheck>] {
        if self.checkers.is_empty() {
            std::slice::from_ref(&self.guard.checker)
        } else {
            &self.checkers
        }
    }

    fn token(&self, req: &Request) -> Option<String> {
        req.header(&self.guard.token_header)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }

    fn run_with(&self, ctx: AuthContext, req: &mut Request, res: &mut Response) {
        if let Err(rejected) = req.set_auth_context(ctx) {
            warn!(
                request_id = %req.request_id,
                rejected = %rejected,
                "auth context already set; keeping the first"
            );
        }
        self.handler.call(req, res);
    }

    fn check_token(&self, token: String, req: &mut Request, res: &mut Response) {
        if all_pass(self.checkers(), |c| c.is_token_valid(&token)) {
            self.run_with(AuthContext::Token(token), req, res);
        } else {
            self.guard.reject(req, res, 401, TOKEN_INVALID_BODY);
        }
    }

    /// Load and validate the session identity. On failure the redirect has
    /// already been written.
    fn check_session(
        &self,
        req: &mut Request,
        res: &mut Response,
        store_error_text: bool,
    ) -> Option<String> {
        let session = match self.guard.flasher.store().get(req, &self.guard.auth_key) {
            Ok(session) => session,
            Err(e) => {
                warn!(request_id = %req.request_id, error = %e, "auth session unavailable");
                let message = if store_error_text {
                    e.to_string()
                } else {
                    requires_auth_message(req)
                };
                self.guard.redirect_to_login(req, res, &message);
                return None;
            }
        };

        let identity = session.get_str(SESSION_ID_KEY).map(str::to_string);
        match identity {
            Some(id) if all_pass(self.checkers(), |c| c.is_valid(&id)) => Some(id),
            _ => {
                let message = requires_auth_message(req);
                self.guard.redirect_to_login(req, res, &message);
                None
            }
        }
    }
}

impl Handler for Protected {
    fn call(&self, req: &mut Request, res: &mut Response) {
        match self.mode {
            Mode::Token => match self.token(req) {
                Some(token) => self.check_token(token, req, res),
                None => self.guard.reject(req, res, 403, TOKEN_MISSING_BODY),
            },
            Mode::Session => {
                if let Some(id) = self.check_session(req, res, true) {
                    self.run_with(AuthContext::Identity(id), req, res);
                }
            }
            Mode::SessionOrToken => match self.token(req) {
                Some(token) => self.check_token(token, req, res),
                None => {
                    if let Some(id) = self.check_session(req, res, false) {
                        self.run_with(AuthContext::Identity(id), req, res);
                    }
                }
            },
        }
    }
}
