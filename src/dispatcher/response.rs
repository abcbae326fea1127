use super::request::{HeaderVec, Request};
use http::Method;
use minijinja::HtmlEscape;
use smallvec::SmallVec;
use std::borrow::Cow;
use std::sync::Arc;

/// The response sink handed to middleware and handlers.
///
/// Mirrors a streaming HTTP writer: the first status written sticks, and
/// writing body bytes without a status implies `200`. Cookies are kept apart
/// from other headers so a later `Set-Cookie` for the same name replaces the
/// earlier one instead of sending both.
#[derive(Debug, Default)]
pub struct Response {
    status: Option<u16>,
    headers: HeaderVec,
    cookies: SmallVec<[(String, String); 4]>,
    body: Vec<u8>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status that will be sent; `200` if nothing was written yet.
    pub fn status(&self) -> u16 {
        self.status.unwrap_or(200)
    }

    pub fn status_written(&self) -> bool {
        self.status.is_some()
    }

    /// Write the status line. Returns `false` and leaves the response
    /// untouched when a status was already written.
    pub fn set_status(&mut self, code: u16) -> bool {
        if self.status.is_some() {
            return false;
        }
        self.status = Some(code);
        true
    }

    /// Drop everything written so far. Used by the recovery boundary before
    /// the error handler runs.
    pub(crate) fn reset(&mut self) {
        *self = Response::default();
    }

    /// Replace any header with the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.add_header(name, value);
    }

    pub fn add_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers
            .push((Arc::from(name.to_ascii_lowercase()), value.into()));
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Queue a `Set-Cookie` header for cookie `name`, replacing one queued
    /// earlier for the same name.
    pub fn set_cookie(&mut self, name: &str, header_value: String) {
        match self.cookies.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = header_value,
            None => self.cookies.push((name.to_string(), header_value)),
        }
    }

    /// Queued `Set-Cookie` value for cookie `name`.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_cookies(&self) -> impl Iterator<Item = &str> {
        self.cookies.iter().map(|(_, v)| v.as_str())
    }

    pub fn write(&mut self, bytes: &[u8]) {
        if self.status.is_none() {
            self.status = Some(200);
        }
        self.body.extend_from_slice(bytes);
    }

    pub fn write_str(&mut self, text: &str) {
        self.write(text.as_bytes());
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Send `code` with a `Location` header. GET and HEAD requests also get
    /// a short HTML body pointing at the target.
    pub fn redirect(&mut self, req: &Request, url: &str, code: u16) {
        self.set_header("location", url);
        if !self.set_status(code) {
            return;
        }
        if req.method == Method::GET || req.method == Method::HEAD {
            self.set_header("content-type", "text/html; charset=utf-8");
            let text = http::StatusCode::from_u16(code)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("Redirect");
            self.write_str(&format!(
                "<a href=\"{}\">{}</a>.\n",
                HtmlEscape(url),
                text
            ));
        }
    }

    pub(crate) fn into_parts(self) -> (u16, HeaderVec, Vec<String>, Vec<u8>) {
        let status = self.status();
        let cookies = self.cookies.into_iter().map(|(_, v)| v).collect();
        (status, self.headers, cookies, self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_status_wins() {
        let mut res = Response::new();
        assert!(res.set_status(404));
        assert!(!res.set_status(200));
        res.write_str("gone");
        assert_eq!(res.status(), 404);
        assert_eq!(res.body_text(), "gone");
    }

    #[test]
    fn test_write_implies_ok() {
        let mut res = Response::new();
        assert!(!res.status_written());
        res.write_str("hi");
        assert!(res.status_written());
        assert!(!res.set_status(500));
        assert_eq!(res.status(), 200);
    }

    #[test]
    fn test_cookie_replaced_by_name() {
        let mut res = Response::new();
        res.set_cookie("a", "a=1".into());
        res.set_cookie("b", "b=1".into());
        res.set_cookie("a", "a=2".into());
        let all: Vec<&str> = res.set_cookies().collect();
        assert_eq!(all, vec!["a=2", "b=1"]);
    }

    #[test]
    fn test_redirect_get_writes_body() {
        let req = Request::new(Method::GET, "/account");
        let mut res = Response::new();
        res.redirect(&req, "/login?next=<x>", 303);
        assert_eq!(res.status(), 303);
        assert_eq!(res.header("Location"), Some("/login?next=<x>"));
        assert!(res.body_text().contains("See Other"));
        assert!(res.body_text().contains("&lt;x&gt;"));
        assert!(res.body_text().contains("href=\"&#x2f;login?next=&lt;x&gt;\""));
    }

    #[test]
    fn test_redirect_post_has_no_body() {
        let req = Request::new(Method::POST, "/login");
        let mut res = Response::new();
        res.redirect(&req, "/", 303);
        assert_eq!(res.status(), 303);
        assert!(res.body().is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut res = Response::new();
        res.set_header("x-a", "1");
        res.set_cookie("s", "s=1".into());
        res.write_str("partial");
        res.reset();
        assert!(!res.status_written());
        assert!(res.headers().is_empty());
        assert_eq!(res.set_cookies().count(), 0);
        assert!(res.body().is_empty());
    }
}
