use super::RenderError;
use minijinja::{AutoEscape, Environment, Value};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A parsed template set ready to execute.
///
/// Every file is registered under its base name, so templates in the set
/// can `extends`/`include` each other by that name. The first file is the
/// entry point.
pub struct CompiledTemplate {
    env: Environment<'static>,
    entry: String,
}

impl CompiledTemplate {
    /// Read and parse `paths`, installing `functions` as globals.
    pub fn load(
        paths: &[PathBuf],
        functions: &[(String, Value)],
        escape: AutoEscape,
    ) -> Result<Self, RenderError> {
        let first = paths.first().ok_or(RenderError::NoTemplates)?;
        let entry = base_name(first);

        let mut env = Environment::new();
        env.set_auto_escape_callback(move |_| escape.clone());
        for (name, func) in functions {
            env.add_global(name.clone(), func.clone());
        }
        for path in paths {
            let source = fs::read_to_string(path).map_err(|source| RenderError::Io {
                path: path.clone(),
                source,
            })?;
            env.add_template_owned(base_name(path), source)?;
        }
        // Surface a missing entry as a parse error rather than at render time.
        env.get_template(&entry)?;
        Ok(Self { env, entry })
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, RenderError> {
        let tmpl = self.env.get_template(&self.entry)?;
        Ok(tmpl.render(ctx)?)
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Parsed templates keyed by the joined template name list.
///
/// With caching off every acquire parses. With caching on, hits take only
/// the read lock; a miss parses while holding the write lock and re-checks
/// first, so concurrent first requests for one key parse it once. Entries
/// are never evicted or revalidated against the files: edits show up after
/// a restart.
pub struct TemplateCache {
    enabled: bool,
    entries: RwLock<HashMap<String, Arc<CompiledTemplate>>>,
    parses: AtomicUsize,
}

impl TemplateCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: RwLock::new(HashMap::new()),
            parses: AtomicUsize::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of entries held.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// How many times a template set has been parsed.
    pub fn parse_count(&self) -> usize {
        self.parses.load(Ordering::Relaxed)
    }

    pub fn acquire<F>(&self, key: &str, parse: F) -> Result<Arc<CompiledTemplate>, RenderError>
    where
        F: FnOnce() -> Result<CompiledTemplate, RenderError>,
    {
        if !self.enabled {
            self.parses.fetch_add(1, Ordering::Relaxed);
            return parse().map(Arc::new);
        }

        if let Some(hit) = self.entries.read().get(key) {
            return Ok(Arc::clone(hit));
        }

        let mut entries = self.entries.write();
        if let Some(hit) = entries.get(key) {
            return Ok(Arc::clone(hit));
        }
        self.parses.fetch_add(1, Ordering::Relaxed);
        let compiled = Arc::new(parse()?);
        entries.insert(key.to_string(), Arc::clone(&compiled));
        debug!(key = %key, cached = entries.len(), "template cached");
        Ok(compiled)
    }
}
