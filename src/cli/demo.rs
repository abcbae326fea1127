//! The demo application behind `gantry serve`.

use crate::app::App;
use crate::auth::{AuthCheck, AuthContext, AuthError, AuthGuard};
use crate::config::{AppConfig, ConfigValue};
use crate::dispatcher::{Dispatcher, Request, Response};
use crate::flash::Flasher;
use crate::middleware::{MetricsMiddleware, Middleware, TracingMiddleware};
use crate::render::Renderer;
use crate::session::{CookieStore, MemoryStore, SessionStore};
use http::Method;
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

/// Accepts the users and API tokens listed in `app_config`.
///
/// `users` maps user names to passwords, `api_tokens` lists bearer tokens.
#[derive(Debug, Default, Clone)]
pub struct DemoChecker {
    users: BTreeMap<String, String>,
    tokens: HashSet<String>,
}

impl DemoChecker {
    pub fn from_config(config: &AppConfig) -> Self {
        let users = config
            .get_config_map("users")
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| v.as_str().map(|p| (k.clone(), p.to_string())))
                    .collect()
            })
            .unwrap_or_default();
        let tokens = config
            .lookup("api_tokens")
            .value()
            .and_then(ConfigValue::as_list)
            .map(|l| l.iter().filter_map(ConfigValue::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        Self { users, tokens }
    }

    pub fn verify_password(&self, user: &str, password: &str) -> bool {
        self.users
            .get(user)
            .is_some_and(|p| bool::from(p.as_bytes().ct_eq(password.as_bytes())))
    }
}

impl AuthCheck for DemoChecker {
    fn is_valid(&self, identity: &str) -> Result<bool, AuthError> {
        Ok(self.users.contains_key(identity))
    }

    fn is_token_valid(&self, token: &str) -> Result<bool, AuthError> {
        // Every token is compared, no early exit.
        let matched = self
            .tokens
            .iter()
            .fold(0u8, |acc, known| acc | known.as_bytes().ct_eq(token.as_bytes()).unwrap_u8());
        Ok(matched == 1)
    }
}

fn session_store(config: &AppConfig) -> anyhow::Result<Arc<dyn SessionStore>> {
    if config.session_keys.is_empty() {
        warn!("no sess_keys configured; sessions are kept in memory");
        return Ok(Arc::new(MemoryStore::new()));
    }
    Ok(Arc::new(CookieStore::new(&config.session_keys)?))
}

/// Wire the demo routes onto an [`App`] for `config`.
pub fn build_demo(config: AppConfig) -> anyhow::Result<App> {
    let shared = Arc::new(config);
    let checker = Arc::new(DemoChecker::from_config(&shared));
    let flasher = Flasher::new(session_store(&shared)?);
    let metrics = Arc::new(MetricsMiddleware::new());
    let guard = AuthGuard::new(flasher.clone(), Arc::clone(&checker) as Arc<dyn AuthCheck>, "/login")
        .with_metrics(Arc::clone(&metrics));
    let renderer = Renderer::from_config(&shared);

    let index = {
        let (renderer, flasher, guard) = (renderer.clone(), flasher.clone(), guard.clone());
        move |req: &mut Request, res: &mut Response| {
            let flashes = flasher.get_flashes(req, res);
            let user = guard.session_identity(req);
            renderer.render_templates(req, res, &json!({ "flashes": flashes, "user": user }), &[
                "index.html",
                "layout.html",
            ]);
        }
    };

    let login_form = {
        let (renderer, flasher) = (renderer.clone(), flasher.clone());
        move |req: &mut Request, res: &mut Response| {
            let flashes = flasher.get_flashes(req, res);
            renderer.render_templates(req, res, &json!({ "flashes": flashes }), &[
                "login.html",
                "layout.html",
            ]);
        }
    };

    let login = {
        let (flasher, guard, checker) = (flasher.clone(), guard.clone(), Arc::clone(&checker));
        move |req: &mut Request, res: &mut Response| {
            let user = req.form_value("username").unwrap_or_default();
            let password = req.form_value("password").unwrap_or_default();
            if !checker.verify_password(&user, &password) {
                flasher.set_error_flash(req, res, "Invalid user name or password.");
                res.redirect(req, "/login", 303);
                return;
            }
            if let Err(e) = guard.do_login(req, res, &user) {
                warn!(request_id = %req.request_id, error = %e, "login failed");
                flasher.set_error_flash(req, res, &e.to_string());
                res.redirect(req, "/login", 303);
                return;
            }
            info!(request_id = %req.request_id, user = %user, "user logged in");
            flasher.set_success_flash(req, res, &format!("Welcome back, {user}."));
            res.redirect(req, "/account", 303);
        }
    };

    let logout = {
        let (flasher, guard) = (flasher.clone(), guard.clone());
        move |req: &mut Request, res: &mut Response| {
            if let Err(e) = guard.do_logout(req, res) {
                warn!(request_id = %req.request_id, error = %e, "logout failed");
            }
            flasher.set_success_flash(req, res, "You have been logged out.");
            res.redirect(req, "/", 303);
        }
    };

    let account = {
        let (renderer, flasher) = (renderer.clone(), flasher.clone());
        move |req: &mut Request, res: &mut Response| {
            let user = req.auth_context().map(|c| c.as_str().to_string());
            let flashes = flasher.get_flashes(req, res);
            renderer.render_templates(req, res, &json!({ "flashes": flashes, "user": user }), &[
                "account.html",
                "layout.html",
            ]);
        }
    };

    let me = {
        let renderer = renderer.clone();
        move |req: &mut Request, res: &mut Response| {
            let authenticated = req.auth_context().is_some_and(AuthContext::is_token);
            renderer.render_json(res, &json!({ "authenticated": authenticated, "via": "token" }));
        }
    };

    let whoami = {
        let renderer = renderer.clone();
        move |req: &mut Request, res: &mut Response| {
            let body = match req.auth_context() {
                Some(AuthContext::Identity(id)) => json!({ "via": "session", "user": id }),
                Some(AuthContext::Token(_)) => json!({ "via": "token" }),
                None => json!({ "via": null }),
            };
            renderer.render_json(res, &body);
        }
    };

    let stats = {
        let (renderer, metrics) = (renderer.clone(), Arc::clone(&metrics));
        move |_req: &mut Request, res: &mut Response| {
            renderer.render_json(
                res,
                &json!({
                    "requests": metrics.request_count(),
                    "average_latency_ms": metrics.average_latency().as_secs_f64() * 1000.0,
                    "server_errors": metrics.server_errors(),
                    "auth_failures": metrics.auth_failures(),
                }),
            );
        }
    };

    let hello = {
        let renderer = renderer.clone();
        move |req: &mut Request, res: &mut Response| {
            let name = req.path_param("name").unwrap_or("stranger");
            renderer.render_message(res, &format!("Hello, {name}!"));
        }
    };

    let not_found = {
        let renderer = renderer.clone();
        move |req: &mut Request, res: &mut Response| {
            renderer.render_templates_code(req, res, 404, &json!({}), &[
                "not_found.html",
                "layout.html",
            ]);
        }
    };

    let dispatcher = Dispatcher::builder()
        .add_middleware(Arc::new(TracingMiddleware))
        .add_middleware(Arc::clone(&metrics) as Arc<dyn Middleware>)
        .route("/", &[Method::GET], index)
        .route("/login", &[Method::GET], login_form)
        .route("/login", &[Method::POST], login)
        .route("/logout", &[Method::GET, Method::POST], logout)
        .route("/account", &[Method::GET], guard.require_session(account))
        .sub_route("/api", "/me", &[Method::GET], guard.require_token(me))
        .sub_route("/api", "/whoami", &[Method::GET], guard.require_session_or_token(whoami))
        .sub_route("/api", "/stats", &[Method::GET], stats)
        .route("/hello/{name}", &[Method::GET], hello)
        .not_found_handler(not_found)
        .build()?;

    Ok(App::new(AppConfig::clone(&shared), dispatcher))
}
