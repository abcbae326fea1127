use crate::dispatcher::Handler;
use http::Method;
use regex::Regex;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Maximum number of path/query parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage. Names are `Arc<str>` shared with the
/// compiled route, values are per-request.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route pattern {pattern:?} has unbalanced braces")]
    UnbalancedBraces { pattern: String },
    #[error("route pattern {pattern:?} has an empty variable name")]
    EmptyVariable { pattern: String },
    #[error("route pattern {pattern:?} does not compile: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Result of matching a request against the route table.
pub struct RouteMatch {
    pub pattern: Arc<str>,
    /// Prefix group for routes added with `sub_route`.
    pub group: Option<Arc<str>>,
    pub handler: Arc<dyn Handler>,
    pub path_params: ParamVec,
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("pattern", &self.pattern)
            .field("group", &self.group)
            .field("path_params", &self.path_params)
            .finish_non_exhaustive()
    }
}

impl RouteMatch {
    /// Path parameter by name; the last occurrence wins.
    #[inline]
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Registered pattern with its handlers, one per method plus an optional
/// catch-all for routes registered without a method list.
struct RouteEntry {
    pattern: Arc<str>,
    group: Option<Arc<str>>,
    regex: Regex,
    /// Parameter name and the index of its capture group.
    params: Vec<(Arc<str>, usize)>,
    by_method: HashMap<Method, Arc<dyn Handler>>,
    any: Option<Arc<dyn Handler>>,
}

impl RouteEntry {
    fn handler_for(&self, method: &Method) -> Option<&Arc<dyn Handler>> {
        self.by_method.get(method).or(self.any.as_ref())
    }
}

/// Description of a registered route, for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    pub pattern: String,
    pub group: Option<String>,
    /// Empty when a handler answers every method.
    pub methods: Vec<String>,
}

/// Ordered route table.
///
/// Patterns are tried in the order they were first registered and the first
/// whose regex and method both match wins. A path that matches some pattern
/// only under a different method keeps looking; if nothing fits the request
/// is not found.
#[derive(Default)]
pub struct Router {
    entries: Vec<RouteEntry>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register `handler` for `pattern` and `methods`.
    ///
    /// An empty `methods` slice answers every method. Registering the same
    /// pattern and method again replaces the earlier handler.
    pub fn add(
        &mut self,
        pattern: &str,
        methods: &[Method],
        handler: Arc<dyn Handler>,
        group: Option<&str>,
    ) -> Result<(), RouteError> {
        let idx = match self.entries.iter().position(|e| e.pattern.as_ref() == pattern) {
            Some(idx) => idx,
            None => {
                let (regex, names) = path_to_regex(pattern)?;
                let params = param_slots(&regex, names);
                self.entries.push(RouteEntry {
                    pattern: Arc::from(pattern),
                    group: group.map(Arc::from),
                    regex,
                    params,
                    by_method: HashMap::new(),
                    any: None,
                });
                self.entries.len() - 1
            }
        };

        let entry = &mut self.entries[idx];
        if methods.is_empty() {
            if entry.any.replace(handler).is_some() {
                warn!(pattern = %pattern, "replaced handler for all methods");
            }
        } else {
            for method in methods {
                if entry
                    .by_method
                    .insert(method.clone(), Arc::clone(&handler))
                    .is_some()
                {
                    warn!(pattern = %pattern, method = %method, "replaced route handler");
                }
            }
        }
        debug!(pattern = %pattern, methods = ?methods, group = ?group, "route registered");
        Ok(())
    }

    pub fn find(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        for entry in &self.entries {
            let Some(caps) = entry.regex.captures(path) else {
                continue;
            };
            let Some(handler) = entry.handler_for(method) else {
                continue;
            };
            let path_params = entry
                .params
                .iter()
                .filter_map(|(name, slot)| {
                    caps.get(*slot).map(|m| (Arc::clone(name), m.as_str().to_string()))
                })
                .collect();
            return Some(RouteMatch {
                pattern: Arc::clone(&entry.pattern),
                group: entry.group.clone(),
                handler: Arc::clone(handler),
                path_params,
            });
        }
        None
    }

    pub fn routes(&self) -> Vec<RouteInfo> {
        self.entries
            .iter()
            .flat_map(|e| {
                let mut methods: Vec<String> =
                    e.by_method.keys().map(|m| m.as_str().to_string()).collect();
                methods.sort();
                let mut out = Vec::with_capacity(2);
                if !methods.is_empty() {
                    out.push(RouteInfo {
                        pattern: e.pattern.to_string(),
                        group: e.group.as_deref().map(str::to_string),
                        methods,
                    });
                }
                if e.any.is_some() {
                    out.push(RouteInfo {
                        pattern: e.pattern.to_string(),
                        group: e.group.as_deref().map(str::to_string),
                        methods: Vec::new(),
                    });
                }
                out
            })
            .collect()
    }
}

/// Pair each variable with the capture index of its `v<i>` group.
fn param_slots(regex: &Regex, names: Vec<Arc<str>>) -> Vec<(Arc<str>, usize)> {
    names
        .into_iter()
        .enumerate()
        .filter_map(|(i, name)| {
            let group = format!("v{i}");
            regex
                .capture_names()
                .position(|n| n == Some(group.as_str()))
                .map(|slot| (name, slot))
        })
        .collect()
}

/// Compile a route pattern into an anchored regex.
///
/// Literal text is matched exactly. `{name}` matches one path segment and
/// `{name:re}` matches `re`. Each variable becomes a named group `v<i>` so
/// capturing groups inside a custom `re` do not shift parameter positions.
pub(crate) fn path_to_regex(pattern: &str) -> Result<(Regex, Vec<Arc<str>>), RouteError> {
    let mut out = String::with_capacity(pattern.len() + 16);
    out.push('^');
    let mut names = Vec::new();
    let mut literal = String::new();
    let mut chars = pattern.char_indices();

    while let Some((start, c)) = chars.next() {
        if c == '}' {
            return Err(RouteError::UnbalancedBraces {
                pattern: pattern.to_string(),
            });
        }
        if c != '{' {
            literal.push(c);
            continue;
        }
        out.push_str(&regex::escape(&literal));
        literal.clear();

        let mut depth = 1;
        let mut end = None;
        for (i, c) in chars.by_ref() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let end = end.ok_or_else(|| RouteError::UnbalancedBraces {
            pattern: pattern.to_string(),
        })?;

        let var = &pattern[start + 1..end];
        let (name, re) = match var.split_once(':') {
            Some((name, re)) => (name.trim(), re),
            None => (var.trim(), "[^/]+"),
        };
        if name.is_empty() {
            return Err(RouteError::EmptyVariable {
                pattern: pattern.to_string(),
            });
        }
        out.push_str(&format!("(?P<v{}>{})", names.len(), re));
        names.push(Arc::from(name));
    }
    out.push_str(&regex::escape(&literal));
    out.push('$');

    let regex = Regex::new(&out).map_err(|source| RouteError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })?;
    Ok((regex, names))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_pattern() {
        let (re, names) = path_to_regex("/about.html").unwrap();
        assert!(names.is_empty());
        assert!(re.is_match("/about.html"));
        assert!(!re.is_match("/aboutXhtml"));
        assert!(!re.is_match("/about.html/extra"));
    }

    #[test]
    fn test_variables_with_custom_regex() {
        let (re, names) = path_to_regex("/users/{id:[0-9]{2,4}}/posts/{slug}").unwrap();
        assert_eq!(names.len(), 2);
        let caps = re.captures("/users/123/posts/hello-world").unwrap();
        assert_eq!(&caps["v0"], "123");
        assert_eq!(&caps["v1"], "hello-world");
        assert!(!re.is_match("/users/12345/posts/x"));
    }

    #[test]
    fn test_capturing_group_inside_variable() {
        let (re, _) = path_to_regex("/f/{name:(a|b)+}/{rest}").unwrap();
        let caps = re.captures("/f/abba/z").unwrap();
        assert_eq!(&caps["v0"], "abba");
        assert_eq!(&caps["v1"], "z");
    }

    #[test]
    fn test_unbalanced_and_empty() {
        assert!(matches!(
            path_to_regex("/a/{id"),
            Err(RouteError::UnbalancedBraces { .. })
        ));
        assert!(matches!(
            path_to_regex("/a/id}"),
            Err(RouteError::UnbalancedBraces { .. })
        ));
        assert!(matches!(
            path_to_regex("/a/{}"),
            Err(RouteError::EmptyVariable { .. })
        ));
        assert!(matches!(
            path_to_regex("/a/{id:(}"),
            Err(RouteError::InvalidPattern { .. })
        ));
    }
}
