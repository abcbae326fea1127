#![allow(dead_code)]

pub mod temp_files {
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    /// A template directory holding `files` (relative path, content).
    pub fn template_dir(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            write(dir.path(), rel, content);
        }
        dir
    }

    pub fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }
}

pub mod fixtures {
    use gantry::auth::{AuthCheck, AuthError};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Checker with fixed sets of good identities and tokens. Counts calls
    /// so tests can assert short-circuiting.
    #[derive(Default)]
    pub struct FixedChecker {
        pub identities: HashSet<String>,
        pub tokens: HashSet<String>,
        pub fail_with_error: bool,
        pub calls: AtomicUsize,
    }

    impl FixedChecker {
        pub fn new(identities: &[&str], tokens: &[&str]) -> Self {
            Self {
                identities: identities.iter().map(|s| s.to_string()).collect(),
                tokens: tokens.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        pub fn failing() -> Self {
            Self {
                fail_with_error: true,
                ..Self::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl AuthCheck for FixedChecker {
        fn is_valid(&self, identity: &str) -> Result<bool, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_with_error {
                return Err(AuthError::Checker("backend down".into()));
            }
            Ok(self.identities.contains(identity))
        }

        fn is_token_valid(&self, token: &str) -> Result<bool, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_with_error {
                return Err(AuthError::Checker("backend down".into()));
            }
            Ok(self.tokens.contains(token))
        }
    }
}

pub mod browser {
    use gantry::dispatcher::{Request, Response};
    use gantry::server::Service;
    use http::Method;
    use std::collections::BTreeMap;

    /// Carries cookies from one response to the next request, the way a
    /// browser would.
    #[derive(Default)]
    pub struct Browser {
        pub cookies: BTreeMap<String, String>,
    }

    impl Browser {
        pub fn request(&self, method: Method, uri: &str) -> Request {
            let mut req = Request::new(method, uri);
            if !self.cookies.is_empty() {
                let header = self
                    .cookies
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                req.push_header("Cookie", &header);
            }
            req
        }

        pub fn absorb(&mut self, res: &Response) {
            for set_cookie in res.set_cookies() {
                let pair = set_cookie.split(';').next().unwrap_or("");
                let Some((name, value)) = pair.split_once('=') else {
                    continue;
                };
                if value.is_empty() || set_cookie.contains("Max-Age=0") {
                    self.cookies.remove(name);
                } else {
                    self.cookies.insert(name.to_string(), value.to_string());
                }
            }
        }

        pub fn send<S: Service>(&mut self, service: &S, mut req: Request) -> Response {
            let mut res = Response::new();
            service.call(&mut req, &mut res);
            self.absorb(&res);
            res
        }

        pub fn get<S: Service>(&mut self, service: &S, uri: &str) -> Response {
            let req = self.request(Method::GET, uri);
            self.send(service, req)
        }
    }
}
