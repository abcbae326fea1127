use crate::auth::AuthContext;
use crate::ids::{RequestId, REQUEST_ID_HEADER};
use crate::router::ParamVec;
use crate::session::Session;
use http::{Extensions, Method};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Maximum inline headers/cookies before heap allocation
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header/cookie storage. Names are lowercased on insert.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// An inbound request as seen by middleware and handlers.
///
/// Everything request-scoped lives here: parsed headers and cookies, the
/// matched route parameters, the authenticated principal and the per-request
/// session cache. Nothing on a `Request` is shared with any other request.
#[derive(Debug)]
pub struct Request {
    pub request_id: RequestId,
    pub method: Method,
    /// Request target as received (path plus query).
    pub uri: String,
    pub path: String,
    /// Host from an absolute request target, else the `Host` header.
    pub host: String,
    pub remote_addr: Option<SocketAddr>,
    pub headers: HeaderVec,
    pub cookies: HeaderVec,
    pub query_params: ParamVec,
    /// Filled in by the dispatcher once a route matches.
    pub path_params: ParamVec,
    /// Pattern of the matched route, if any.
    pub route_pattern: Option<Arc<str>>,
    pub body: Vec<u8>,
    pub received_at: Instant,
    /// Typed request-lifetime storage for middleware.
    pub extensions: Extensions,
    auth: Option<AuthContext>,
    pub(crate) sessions: HashMap<String, Session>,
}

impl Request {
    /// Build a request for `uri`, which may be origin-form (`/a?b=c`) or
    /// absolute-form (`http://host/a?b=c`).
    pub fn new(method: Method, uri: &str) -> Self {
        let (host, target) = split_absolute(uri);
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (target, None),
        };
        let query_params = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        Request {
            request_id: RequestId::new(),
            method,
            uri: target.to_string(),
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            host,
            remote_addr: None,
            headers: HeaderVec::new(),
            cookies: HeaderVec::new(),
            query_params,
            path_params: ParamVec::new(),
            route_pattern: None,
            body: Vec::new(),
            received_at: Instant::now(),
            extensions: Extensions::new(),
            auth: None,
            sessions: HashMap::new(),
        }
    }

    /// Append a header, picking up cookies, host and request id on the way.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.push_header(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn push_header(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "cookie" => self.cookies.extend(parse_cookies(value)),
            "host" if self.host.is_empty() => self.host = value.to_string(),
            REQUEST_ID_HEADER => self.request_id = RequestId::from_header_or_new(Some(value)),
            _ => {}
        }
        self.headers.push((Arc::from(name), value.to_string()));
    }

    /// Header value by name (case-insensitive).
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[inline]
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Path parameter by name; the last occurrence wins.
    #[inline]
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Query parameter by name; the last occurrence wins.
    #[inline]
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Decode the body as `application/x-www-form-urlencoded`.
    pub fn form(&self) -> ParamVec {
        url::form_urlencoded::parse(&self.body)
            .map(|(k, v)| (Arc::from(k.as_ref()), v.into_owned()))
            .collect()
    }

    pub fn form_value(&self, name: &str) -> Option<String> {
        url::form_urlencoded::parse(&self.body)
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    pub fn auth_context(&self) -> Option<&AuthContext> {
        self.auth.as_ref()
    }

    /// Attach the authenticated principal.
    ///
    /// Once set the context is fixed for the rest of the request; a second
    /// call hands the rejected value back.
    pub fn set_auth_context(&mut self, ctx: AuthContext) -> Result<(), AuthContext> {
        if self.auth.is_some() {
            return Err(ctx);
        }
        self.auth = Some(ctx);
        Ok(())
    }
}

fn split_absolute(uri: &str) -> (String, &str) {
    for scheme in ["http://", "https://"] {
        if let Some(rest) = uri.strip_prefix(scheme) {
            return match rest.find('/') {
                Some(idx) => (rest[..idx].to_string(), &rest[idx..]),
                None => (rest.to_string(), "/"),
            };
        }
    }
    (String::new(), uri)
}

/// Parse a `Cookie` header value into name/value pairs.
pub fn parse_cookies(header: &str) -> impl Iterator<Item = (Arc<str>, String)> + '_ {
    header.split(';').filter_map(|pair| {
        let mut parts = pair.trim().splitn(2, '=');
        let name = parts.next()?.trim();
        if name.is_empty() {
            return None;
        }
        let value = parts.next().unwrap_or("").trim().trim_matches('"');
        Some((Arc::from(name), value.to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_and_path_split() {
        let req = Request::new(Method::GET, "/search?q=rust+lang&page=2&page=3");
        assert_eq!(req.path, "/search");
        assert_eq!(req.uri, "/search?q=rust+lang&page=2&page=3");
        assert_eq!(req.query_param("q"), Some("rust lang"));
        assert_eq!(req.query_param("page"), Some("3"));
    }

    #[test]
    fn test_absolute_form_sets_host() {
        let req = Request::new(Method::GET, "http://example.com:8080/a?b=1")
            .with_header("Host", "ignored.test");
        assert_eq!(req.host, "example.com:8080");
        assert_eq!(req.path, "/a");
    }

    #[test]
    fn test_headers_and_cookies() {
        let req = Request::new(Method::GET, "/")
            .with_header("Host", "localhost:7000")
            .with_header("Cookie", "a=1; b=\"two\"; =skip");
        assert_eq!(req.host, "localhost:7000");
        assert_eq!(req.header("host"), Some("localhost:7000"));
        assert_eq!(req.cookie("a"), Some("1"));
        assert_eq!(req.cookie("b"), Some("two"));
        assert_eq!(req.cookies.len(), 2);
    }

    #[test]
    fn test_request_id_header_is_reused() {
        let id = RequestId::new();
        let req = Request::new(Method::GET, "/").with_header("X-Request-Id", &id.to_string());
        assert_eq!(req.request_id, id);
    }

    #[test]
    fn test_form_body() {
        let req = Request::new(Method::POST, "/login").with_body("user=alice&pass=s%20cret");
        assert_eq!(req.form_value("user").as_deref(), Some("alice"));
        assert_eq!(req.form_value("pass").as_deref(), Some("s cret"));
        assert_eq!(req.form().len(), 2);
    }

    #[test]
    fn test_auth_context_is_set_once() {
        let mut req = Request::new(Method::GET, "/");
        assert!(req
            .set_auth_context(AuthContext::Identity("alice".into()))
            .is_ok());
        let rejected = req.set_auth_context(AuthContext::Token("t".into()));
        assert_eq!(rejected, Err(AuthContext::Token("t".into())));
        assert_eq!(
            req.auth_context(),
            Some(&AuthContext::Identity("alice".into()))
        );
    }
}
