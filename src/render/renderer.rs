use super::cache::{CompiledTemplate, TemplateCache};
use super::{functions, RenderError};
use crate::config::{AppConfig, ConfigSource};
use crate::dispatcher::{Request, Response};
use minijinja::value::{FunctionArgs, FunctionResult, Value};
use minijinja::functions::Function;
use minijinja::AutoEscape;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tracing::{error, warn};

/// Body written when `render_templates` is called without template names.
pub const TEMPLATE_REQUIRED_BODY: &str = "Error: Template required!";
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Sub-directory of the template directory that `partial` reads from.
const PARTIALS_DIR: &str = "partials";

struct RendererInner {
    tpl_dir: PathBuf,
    cache: TemplateCache,
    functions: RwLock<Vec<(String, Value)>>,
    config: Option<Arc<dyn ConfigSource>>,
}

impl RendererInner {
    fn acquire(&self, names: &[&str]) -> Result<Arc<CompiledTemplate>, RenderError> {
        if names.is_empty() {
            return Err(RenderError::NoTemplates);
        }
        let key = names.join("|");
        self.cache.acquire(&key, || {
            let paths: Vec<PathBuf> = names.iter().map(|n| self.tpl_dir.join(n)).collect();
            let functions = self.functions.read();
            CompiledTemplate::load(&paths, &functions, AutoEscape::Html)
        })
    }

    fn partial(&self, name: &str, payload: Value) -> Result<Value, minijinja::Error> {
        let rel = format!("{PARTIALS_DIR}/{name}");
        let rendered = self
            .acquire(&[rel.as_str()])
            .and_then(|tpl| tpl.render(payload))
            .map_err(|e| {
                minijinja::Error::new(
                    minijinja::ErrorKind::InvalidOperation,
                    format!("partial {name:?} failed"),
                )
                .with_source(e)
            })?;
        Ok(Value::from_safe_string(rendered))
    }
}

/// HTML, JSON and plain responses, with a shared template cache.
///
/// Cloning is cheap and clones share the cache and registered functions.
/// Register extra template functions before the first render; sets already
/// in the cache keep the functions they were parsed with.
#[derive(Clone)]
pub struct Renderer {
    inner: Arc<RendererInner>,
}

impl Renderer {
    pub fn new(
        tpl_dir: impl Into<PathBuf>,
        cache_templates: bool,
        config: Option<Arc<dyn ConfigSource>>,
    ) -> Self {
        let tpl_dir = tpl_dir.into();
        let inner = Arc::new_cyclic(|weak: &Weak<RendererInner>| {
            let weak = Weak::clone(weak);
            let partial = Value::from_function(move |name: String, payload: Value| {
                match weak.upgrade() {
                    Some(inner) => inner.partial(&name, payload),
                    None => Err(minijinja::Error::new(
                        minijinja::ErrorKind::InvalidOperation,
                        "renderer dropped",
                    )),
                }
            });
            let functions = vec![
                ("host".to_string(), Value::from_function(functions::host)),
                ("marshal".to_string(), Value::from_function(functions::marshal)),
                ("partial".to_string(), partial),
                ("title".to_string(), Value::from_function(functions::title)),
                ("gravatar".to_string(), Value::from_function(functions::gravatar)),
            ];
            RendererInner {
                tpl_dir,
                cache: TemplateCache::new(cache_templates),
                functions: RwLock::new(functions),
                config,
            }
        });
        Self { inner }
    }

    /// Renderer for `config.tpl_dir` honoring `config.cache_tpls`, with the
    /// config injected into every template as `config`.
    pub fn from_config(config: &Arc<AppConfig>) -> Self {
        let source: Arc<dyn ConfigSource> = Arc::clone(config) as Arc<dyn ConfigSource>;
        Self::new(
            config.template_directory.clone(),
            config.cache_templates,
            Some(source),
        )
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.inner.cache
    }

    /// Make `func` callable from templates as `name`, replacing any function
    /// of the same name.
    pub fn register_template_func<F, Rv, Args>(&self, name: &str, func: F)
    where
        F: Function<Rv, Args>,
        Rv: FunctionResult,
        Args: for<'a> FunctionArgs<'a>,
    {
        let value = Value::from_function(func);
        let mut functions = self.inner.functions.write();
        functions.retain(|(n, _)| n != name);
        functions.push((name.to_string(), value));
    }

    /// Render to a string. `data` must serialize to a map; it is merged over
    /// the defaults (`config`, and `request` when a request is given).
    pub fn render_to_string<T: Serialize>(
        &self,
        req: Option<&Request>,
        data: &T,
        names: &[&str],
    ) -> Result<String, RenderError> {
        let tpl = self.inner.acquire(names)?;
        let ctx = self.merged_data(req, data)?;
        tpl.render(ctx)
    }

    fn merged_data<T: Serialize>(
        &self,
        req: Option<&Request>,
        data: &T,
    ) -> Result<JsonValue, RenderError> {
        let mut merged = Map::new();
        if let Some(config) = &self.inner.config {
            merged.insert("config".to_string(), config.snapshot());
        }
        if let Some(req) = req {
            merged.insert(
                "request".to_string(),
                serde_json::json!({
                    "host": req.host,
                    "method": req.method.as_str(),
                    "path": req.path,
                    "uri": req.uri,
                }),
            );
        }
        match serde_json::to_value(data)? {
            JsonValue::Object(map) => merged.extend(map),
            JsonValue::Null => {}
            _ => return Err(RenderError::NotAMap),
        }
        Ok(JsonValue::Object(merged))
    }

    /// Render `names` with status 200.
    pub fn render_templates<T: Serialize>(
        &self,
        req: &Request,
        res: &mut Response,
        data: &T,
        names: &[&str],
    ) {
        self.render_templates_code(req, res, 200, data, names);
    }

    /// Render `names` with status `code`. Any failure becomes a 500 with the
    /// error text as the body.
    pub fn render_templates_code<T: Serialize>(
        &self,
        req: &Request,
        res: &mut Response,
        code: u16,
        data: &T,
        names: &[&str],
    ) {
        if names.is_empty() {
            self.render_error(res, 500, TEMPLATE_REQUIRED_BODY);
            return;
        }
        match self.render_to_string(Some(req), data, names) {
            Ok(body) => {
                res.set_header("content-type", HTML_CONTENT_TYPE);
                res.set_status(code);
                res.write_str(&body);
            }
            Err(e) => {
                error!(
                    request_id = %req.request_id,
                    templates = ?names,
                    error = %e,
                    "template render failed"
                );
                self.render_error(res, 500, &e.to_string());
            }
        }
    }

    /// Serialize `data` as the JSON response body.
    pub fn render_json<T: Serialize + ?Sized>(&self, res: &mut Response, data: &T) {
        match serde_json::to_vec(data) {
            Ok(body) => {
                res.set_header("content-type", "application/json");
                res.set_status(200);
                res.write(&body);
            }
            Err(e) => {
                warn!(error = %e, "json render failed");
                self.render_error(res, 500, &e.to_string());
            }
        }
    }

    pub fn render_error(&self, res: &mut Response, code: u16, message: &str) {
        res.set_status(code);
        res.set_header("content-type", "text/plain; charset=utf-8");
        res.write_str(message);
    }

    pub fn render_message(&self, res: &mut Response, message: &str) {
        self.render_error(res, 200, message);
    }

    pub fn redirect(&self, req: &Request, res: &mut Response, url: &str, code: u16) {
        res.redirect(req, url, code);
    }
}
