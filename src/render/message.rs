use super::cache::CompiledTemplate;
use super::RenderError;
use minijinja::functions::Function;
use minijinja::value::{FunctionArgs, FunctionResult, Value};
use minijinja::AutoEscape;
use serde::Serialize;
use std::path::PathBuf;

/// Renders templates to strings for e-mail and other out-of-band messages.
///
/// Templates are parsed on every call; there is no cache.
pub struct MessageRenderer {
    tpl_dir: PathBuf,
    functions: Vec<(String, Value)>,
}

impl MessageRenderer {
    pub fn new(tpl_dir: impl Into<PathBuf>) -> Self {
        Self {
            tpl_dir: tpl_dir.into(),
            functions: Vec::new(),
        }
    }

    pub fn register_template_func<F, Rv, Args>(&mut self, name: &str, func: F)
    where
        F: Function<Rv, Args>,
        Rv: FunctionResult,
        Args: for<'a> FunctionArgs<'a>,
    {
        self.functions.retain(|(n, _)| n != name);
        self.functions
            .push((name.to_string(), Value::from_function(func)));
    }

    /// Plain-text output; nothing is escaped.
    pub fn render<T: Serialize>(&self, data: &T, names: &[&str]) -> Result<String, RenderError> {
        self.render_with(data, names, AutoEscape::None)
    }

    /// HTML output; interpolated values are escaped.
    pub fn render_html<T: Serialize>(
        &self,
        data: &T,
        names: &[&str],
    ) -> Result<String, RenderError> {
        self.render_with(data, names, AutoEscape::Html)
    }

    fn render_with<T: Serialize>(
        &self,
        data: &T,
        names: &[&str],
        escape: AutoEscape,
    ) -> Result<String, RenderError> {
        if names.is_empty() {
            return Err(RenderError::NoTemplates);
        }
        let paths: Vec<PathBuf> = names.iter().map(|n| self.tpl_dir.join(n)).collect();
        let tpl = CompiledTemplate::load(&paths, &self.functions, escape)?;
        tpl.render(data)
    }
}
