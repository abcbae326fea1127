//! Tests for the authentication guard
//!
//! # Test Coverage
//!
//! - Session variant: redirect + flash when unauthenticated, identity context when logged in
//! - Token variant: 403 without a token, 401 for a rejected token
//! - Combined variant: token precedence, session fallback
//! - Checker lists: AND semantics with short-circuit, errors count as rejection
//! - Login/logout cookie lifetimes and custom session/header names
//! - Login rotates a server-side session id carried in from before

mod common;

use common::browser::Browser;
use common::fixtures::FixedChecker;
use gantry::auth::{AuthCheck, AuthGuard, LOGIN_TTL_SECS, SESSION_AUTH_KEY};
use gantry::dispatcher::{Dispatcher, Request, Response};
use gantry::flash::Flasher;
use gantry::middleware::MetricsMiddleware;
use gantry::session::{CookieStore, MemoryStore, SessionStore};
use http::Method;
use std::sync::Arc;

fn whoami(req: &mut Request, res: &mut Response) {
    match req.auth_context() {
        Some(ctx) if ctx.is_token() => res.write_str(&format!("token:{}", ctx.as_str())),
        Some(ctx) => res.write_str(&format!("identity:{}", ctx.as_str())),
        None => res.write_str("nobody"),
    }
}

struct Fixture {
    dispatcher: Dispatcher,
    metrics: Arc<MetricsMiddleware>,
}

fn fixture_with(store: Arc<dyn SessionStore>, guard: AuthGuard) -> Fixture {
    let metrics = Arc::new(MetricsMiddleware::new());
    let guard = guard.with_metrics(Arc::clone(&metrics));
    let flasher = Flasher::new(store);
    let (login_guard, logout_guard) = (guard.clone(), guard.clone());
    let login_flasher = flasher.clone();

    let dispatcher = Dispatcher::builder()
        .route("/login", &[Method::POST], move |req: &mut Request, res: &mut Response| {
            let user = req.query_param("user").unwrap_or_default().to_string();
            login_guard.do_login(req, res, &user).unwrap();
            res.write_str("logged in");
        })
        .route("/login", &[Method::GET], move |req: &mut Request, res: &mut Response| {
            let flashes = login_flasher.get_flashes(req, res);
            res.write_str(&flashes.errors.join("\n"));
        })
        .route("/logout", &[Method::POST], move |req: &mut Request, res: &mut Response| {
            logout_guard.do_logout(req, res).unwrap();
        })
        .route("/account", &[Method::GET], guard.require_session(whoami))
        .route("/api/token", &[Method::GET], guard.require_token(whoami))
        .route("/api/either", &[Method::GET], guard.require_session_or_token(whoami))
        .build()
        .unwrap();
    Fixture { dispatcher, metrics }
}

fn fixture(checker: FixedChecker) -> Fixture {
    let store: Arc<dyn SessionStore> = Arc::new(CookieStore::new(["test-key"]).unwrap());
    let guard = AuthGuard::new(Flasher::new(Arc::clone(&store)), Arc::new(checker), "/login");
    fixture_with(store, guard)
}

fn post(browser: &mut Browser, d: &Dispatcher, uri: &str) -> Response {
    let req = browser.request(Method::POST, uri);
    browser.send(d, req)
}

#[test]
fn test_session_variant_redirects_with_flash() {
    let f = fixture(FixedChecker::new(&["alice"], &[]));
    let mut browser = Browser::default();

    let res = browser.get(&f.dispatcher, "/account?tab=keys");
    assert_eq!(res.status(), 303);
    assert_eq!(res.header("location"), Some("/login"));
    assert!(!res.body_text().contains("identity"));

    let res = browser.get(&f.dispatcher, "/login");
    assert_eq!(res.body_text(), "/account?tab=keys requires authentication.");

    // Read once.
    let res = browser.get(&f.dispatcher, "/login");
    assert_eq!(res.body_text(), "");
    assert_eq!(f.metrics.auth_failures(), 1);
}

#[test]
fn test_login_then_logout() {
    let f = fixture(FixedChecker::new(&["alice"], &[]));
    let mut browser = Browser::default();

    let res = post(&mut browser, &f.dispatcher, "/login?user=alice");
    let cookie = res.cookie(SESSION_AUTH_KEY).unwrap();
    assert!(cookie.contains(&format!("Max-Age={LOGIN_TTL_SECS}")));

    let res = browser.get(&f.dispatcher, "/account");
    assert_eq!(res.status(), 200);
    assert_eq!(res.body_text(), "identity:alice");

    let res = post(&mut browser, &f.dispatcher, "/logout");
    assert!(res.cookie(SESSION_AUTH_KEY).unwrap().contains("Max-Age=0"));
    assert_eq!(browser.get(&f.dispatcher, "/account").status(), 303);
}

#[test]
fn test_login_rotates_planted_session_id() {
    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    let guard = AuthGuard::new(
        Flasher::new(Arc::clone(&store)),
        Arc::new(FixedChecker::new(&["alice", "mallory"], &[])),
        "/login",
    );
    let f = fixture_with(store, guard);

    let mut attacker = Browser::default();
    post(&mut attacker, &f.dispatcher, "/login?user=mallory");
    let planted = attacker.cookies[SESSION_AUTH_KEY].clone();

    let mut victim = Browser::default();
    victim.cookies.insert(SESSION_AUTH_KEY.to_string(), planted.clone());
    post(&mut victim, &f.dispatcher, "/login?user=alice");
    assert_ne!(victim.cookies[SESSION_AUTH_KEY], planted);
    assert_eq!(victim.get(&f.dispatcher, "/account").body_text(), "identity:alice");

    let res = attacker.get(&f.dispatcher, "/account");
    assert_eq!(res.status(), 303);
    assert_ne!(res.body_text(), "identity:alice");
}

#[test]
fn test_session_identity_must_pass_checker() {
    let f = fixture(FixedChecker::new(&["alice"], &[]));
    let mut browser = Browser::default();
    post(&mut browser, &f.dispatcher, "/login?user=mallory");
    assert_eq!(browser.get(&f.dispatcher, "/account").status(), 303);
}

#[test]
fn test_tampered_session_cookie_redirects() {
    let f = fixture(FixedChecker::new(&["alice"], &[]));
    let mut browser = Browser::default();
    post(&mut browser, &f.dispatcher, "/login?user=alice");
    let value = browser.cookies.get_mut(SESSION_AUTH_KEY).unwrap();
    value.insert(0, 'A');

    let res = browser.get(&f.dispatcher, "/account");
    assert_eq!(res.status(), 303);
    let flash = browser.get(&f.dispatcher, "/login").body_text().into_owned();
    assert!(flash.contains(SESSION_AUTH_KEY), "store error is flashed: {flash}");
}

#[test]
fn test_token_variant() {
    let f = fixture(FixedChecker::new(&[], &["good"]));
    let mut browser = Browser::default();

    let res = browser.get(&f.dispatcher, "/api/token");
    assert_eq!(res.status(), 403);
    assert_eq!(res.body_text(), "Authorization required.");

    let req = browser.request(Method::GET, "/api/token").with_header("X-User-Token", "   ");
    assert_eq!(browser.send(&f.dispatcher, req).status(), 403);

    let req = browser.request(Method::GET, "/api/token").with_header("x-user-token", "bad");
    let res = browser.send(&f.dispatcher, req);
    assert_eq!(res.status(), 401);
    assert_eq!(res.body_text(), "Unauthorized.");

    let req = browser.request(Method::GET, "/api/token").with_header("X-User-Token", "good");
    let res = browser.send(&f.dispatcher, req);
    assert_eq!(res.status(), 200);
    assert_eq!(res.body_text(), "token:good");
    assert_eq!(f.metrics.auth_failures(), 3);
}

#[test]
fn test_combined_variant_prefers_token() {
    let f = fixture(FixedChecker::new(&["alice"], &["good"]));
    let mut browser = Browser::default();

    let res = browser.get(&f.dispatcher, "/api/either");
    assert_eq!(res.status(), 303);

    let req = browser.request(Method::GET, "/api/either").with_header("X-User-Token", "good");
    assert_eq!(browser.send(&f.dispatcher, req).body_text(), "token:good");

    post(&mut browser, &f.dispatcher, "/login?user=alice");
    assert_eq!(
        browser.get(&f.dispatcher, "/api/either").body_text(),
        "identity:alice"
    );

    // A bad token is not rescued by a good session.
    let req = browser.request(Method::GET, "/api/either").with_header("X-User-Token", "bad");
    assert_eq!(browser.send(&f.dispatcher, req).status(), 401);
}

#[test]
fn test_checker_list_short_circuits() {
    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    let default = Arc::new(FixedChecker::new(&[], &["tok"]));
    let rejecting = Arc::new(FixedChecker::new(&[], &[]));
    let never = Arc::new(FixedChecker::new(&[], &["tok"]));
    let guard = AuthGuard::new(
        Flasher::new(Arc::clone(&store)),
        Arc::clone(&default) as Arc<dyn AuthCheck>,
        "/login",
    );

    let strict = guard.require_token(whoami).with_checkers(vec![
        Arc::clone(&rejecting) as Arc<dyn AuthCheck>,
        Arc::clone(&never) as Arc<dyn AuthCheck>,
    ]);
    let relaxed = guard.require_token(whoami).with_checkers(Vec::new());
    let d = Dispatcher::builder()
        .route("/strict", &[], strict)
        .route("/relaxed", &[], relaxed)
        .build()
        .unwrap();

    let mut browser = Browser::default();
    let req = browser.request(Method::GET, "/strict").with_header("X-User-Token", "tok");
    assert_eq!(browser.send(&d, req).status(), 401);
    assert_eq!(rejecting.calls(), 1);
    assert_eq!(never.calls(), 0);
    assert_eq!(default.calls(), 0);

    let req = browser.request(Method::GET, "/relaxed").with_header("X-User-Token", "tok");
    assert_eq!(browser.send(&d, req).status(), 200);
    assert_eq!(default.calls(), 1);
}

#[test]
fn test_checker_error_counts_as_rejection() {
    let f = fixture(FixedChecker::failing());
    let mut browser = Browser::default();
    let req = browser.request(Method::GET, "/api/token").with_header("X-User-Token", "any");
    assert_eq!(browser.send(&f.dispatcher, req).status(), 401);
}

#[test]
fn test_custom_session_name_and_header() {
    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    let guard = AuthGuard::custom(
        Flasher::new(Arc::clone(&store)),
        Arc::new(FixedChecker::new(&["bob"], &["k"])),
        "/signin",
        "myauth",
        "X-Api-Key",
    );
    assert_eq!(guard.login_url(), "/signin");
    let f = fixture_with(store, guard);
    let mut browser = Browser::default();

    let res = post(&mut browser, &f.dispatcher, "/login?user=bob");
    assert!(res.cookie("myauth").is_some());
    assert!(res.cookie(SESSION_AUTH_KEY).is_none());
    assert_eq!(browser.get(&f.dispatcher, "/account").body_text(), "identity:bob");

    let mut anon = Browser::default();
    let res = anon.get(&f.dispatcher, "/account");
    assert_eq!(res.header("location"), Some("/signin"));

    let req = anon.request(Method::GET, "/api/token").with_header("X-Api-Key", "k");
    assert_eq!(anon.send(&f.dispatcher, req).body_text(), "token:k");
    let req = anon.request(Method::GET, "/api/token").with_header("X-User-Token", "k");
    assert_eq!(anon.send(&f.dispatcher, req).status(), 403);
}

#[test]
fn test_first_auth_context_is_kept() {
    let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
    let guard = AuthGuard::new(
        Flasher::new(Arc::clone(&store)),
        Arc::new(FixedChecker::new(&[], &["outer", "inner"])),
        "/login",
    );
    let nested = guard.require_token(guard.require_token(whoami));
    let d = Dispatcher::builder().route("/n", &[], nested).build().unwrap();

    let mut req = Request::new(Method::GET, "/n").with_header("X-User-Token", "outer");
    let mut res = Response::new();
    gantry::server::Service::call(&d, &mut req, &mut res);
    assert_eq!(res.body_text(), "token:outer");
}
