use crate::dispatcher::{Request, Response};
use http::Method;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Serves files from one directory.
///
/// URL paths are mapped component by component; anything other than plain
/// names (`..`, roots, prefixes) is refused, so a request cannot escape the
/// base directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    base_dir: PathBuf,
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base_dir: base.into() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    pub fn content_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase()
            .as_str()
        {
            "html" | "htm" => "text/html; charset=utf-8",
            "css" => "text/css; charset=utf-8",
            "js" | "mjs" => "application/javascript",
            "json" => "application/json",
            "txt" => "text/plain; charset=utf-8",
            "xml" => "application/xml",
            "svg" => "image/svg+xml",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "ico" => "image/x-icon",
            "webp" => "image/webp",
            "woff" => "font/woff",
            "woff2" => "font/woff2",
            "pdf" => "application/pdf",
            "wasm" => "application/wasm",
            _ => "application/octet-stream",
        }
    }

    /// Read the file for `url_path`. A directory resolves to its
    /// `index.html`.
    pub fn load(&self, url_path: &str) -> io::Result<(Vec<u8>, &'static str)> {
        let mut path = self
            .map_path(url_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "invalid path"))?;
        if path.is_dir() {
            path.push("index.html");
        }
        if !path.is_file() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        }
        let bytes = fs::read(&path)?;
        Ok((bytes, Self::content_type(&path)))
    }

    /// Answer `req` with the file at `url_path`. Returns `false` without
    /// touching the response when there is no such file.
    pub fn serve(&self, req: &Request, res: &mut Response, url_path: &str) -> bool {
        match self.load(url_path) {
            Ok((bytes, content_type)) => {
                res.set_header("content-type", content_type);
                res.set_header("content-length", bytes.len().to_string());
                res.set_status(200);
                if req.method != Method::HEAD {
                    res.write(&bytes);
                }
                true
            }
            Err(e) => {
                debug!(
                    request_id = %req.request_id,
                    dir = %self.base_dir.display(),
                    path = %url_path,
                    error = %e,
                    "static file not served"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), "Hello\n").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs").join("index.html"), "<h1>Docs</h1>").unwrap();
        dir
    }

    #[test]
    fn test_map_path_prevents_traversal() {
        let sf = StaticFiles::new("static");
        assert!(sf.map_path("../Cargo.toml").is_none());
        assert!(sf.map_path("a/../../Cargo.toml").is_none());
        assert_eq!(
            sf.map_path("/css/./site.css"),
            Some(PathBuf::from("static/css/site.css"))
        );
    }

    #[test]
    fn test_load_plain_file_and_index() {
        let dir = fixture();
        let sf = StaticFiles::new(dir.path());
        let (bytes, ct) = sf.load("hello.txt").unwrap();
        assert_eq!(ct, "text/plain; charset=utf-8");
        assert_eq!(bytes, b"Hello\n");

        let (bytes, ct) = sf.load("/docs/").unwrap();
        assert_eq!(ct, "text/html; charset=utf-8");
        assert_eq!(bytes, b"<h1>Docs</h1>");
    }

    #[test]
    fn test_serve_head_has_no_body() {
        let dir = fixture();
        let sf = StaticFiles::new(dir.path());
        let req = Request::new(Method::HEAD, "/hello.txt");
        let mut res = Response::new();
        assert!(sf.serve(&req, &mut res, "hello.txt"));
        assert_eq!(res.status(), 200);
        assert_eq!(res.header("content-length"), Some("6"));
        assert!(res.body().is_empty());
    }

    #[test]
    fn test_serve_missing_leaves_response_alone() {
        let dir = fixture();
        let sf = StaticFiles::new(dir.path());
        let req = Request::new(Method::GET, "/nope");
        let mut res = Response::new();
        assert!(!sf.serve(&req, &mut res, "nope"));
        assert!(!res.status_written());
    }
}
