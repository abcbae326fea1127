//! The application: one [`Dispatcher`], the asset mounts and the listener
//! setup, configured from an [`AppConfig`].

use crate::config::{AppConfig, RuntimeConfig};
use crate::dispatcher::{Dispatcher, Request, Response};
use crate::server::{HttpServer, ServeError, ServerHandle, Service};
use crate::static_files::StaticFiles;
use http::Method;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

/// URL prefix the asset directory is always mounted under.
pub const STATIC_PREFIX: &str = "/static/";

pub struct App {
    config: AppConfig,
    dispatcher: Dispatcher,
    assets: Vec<(String, StaticFiles)>,
    runtime: RuntimeConfig,
}

impl App {
    /// Mounts `config.asset_dir` under `/static/`.
    pub fn new(config: AppConfig, dispatcher: Dispatcher) -> Self {
        let assets = vec![(
            STATIC_PREFIX.to_string(),
            StaticFiles::new(config.asset_directory.clone()),
        )];
        Self {
            config,
            dispatcher,
            assets,
            runtime: RuntimeConfig::from_env(),
        }
    }

    pub fn bind(mut self, bind: impl Into<String>) -> Self {
        self.config.bind = bind.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn port_increment(mut self, enabled: bool) -> Self {
        self.config.port_increment = enabled;
        self
    }

    pub fn runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// Serve files from `dir` for GET and HEAD requests under `prefix`. The
    /// prefix is stripped before the file is looked up.
    pub fn route_asset(mut self, prefix: &str, dir: impl Into<PathBuf>) -> Self {
        let mut prefix = prefix.to_string();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        self.assets.retain(|(p, _)| *p != prefix);
        self.assets.push((prefix, StaticFiles::new(dir)));
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Routes first, then asset mounts, then the catch-all asset lookup,
    /// then the not-found handler.
    pub fn handle(&self, req: &mut Request, res: &mut Response) {
        if let Some(route) = self.dispatcher.match_route(&req.method, &req.path) {
            self.dispatcher.run_route(route, req, res);
            return;
        }
        if req.method == Method::GET || req.method == Method::HEAD {
            if self.serve_asset(req, res) {
                return;
            }
            if self.config.catch_all {
                let files = StaticFiles::new(self.config.asset_directory.clone());
                let path = req.path.clone();
                if files.serve(req, res, &path) {
                    return;
                }
            }
        }
        self.dispatcher.serve_not_found(req, res);
    }

    fn serve_asset(&self, req: &Request, res: &mut Response) -> bool {
        self.assets
            .iter()
            .filter(|(prefix, _)| req.path.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .is_some_and(|(prefix, files)| files.serve(req, res, &req.path[prefix.len()..]))
    }

    /// Bind and start serving. With `port_inc`, a taken port is retried one
    /// higher after the runtime retry delay until a bind succeeds.
    ///
    /// # Errors
    ///
    /// Any bind failure other than a taken port under `port_inc`.
    pub fn start(self) -> Result<ServerHandle, ServeError> {
        let bind = self.config.bind.clone();
        let mut port = self.config.port;
        let retry_inc = self.config.port_increment;
        let runtime = self.runtime;
        let app = Arc::new(self);

        loop {
            let addr = socket_addr(&bind, port);
            match HttpServer(Arc::clone(&app)).start(addr.as_str(), runtime.workers) {
                Ok(handle) => {
                    info!(addr = %handle.local_addr(), "application started");
                    return Ok(handle);
                }
                Err(ServeError::AddrInUse { addr }) if retry_inc => {
                    warn!(addr = %addr, "address in use, trying next port");
                    thread::sleep(runtime.port_retry_delay);
                    port = port.checked_add(1).ok_or_else(|| {
                        ServeError::Config("no free port left to increment to".to_string())
                    })?;
                }
                Err(e) => {
                    error!(addr = %addr, error = %e, "failed to start server");
                    return Err(e);
                }
            }
        }
    }

    /// [`start`](Self::start), then block until the server exits.
    pub fn run(self) -> Result<(), ServeError> {
        let handle = self.start()?;
        if handle.join().is_err() {
            error!("server worker panicked");
        }
        Ok(())
    }
}

impl Service for App {
    fn call(&self, req: &mut Request, res: &mut Response) {
        self.handle(req, res);
    }
}

fn socket_addr(bind: &str, port: u16) -> String {
    if bind.contains(':') && !bind.starts_with('[') {
        format!("[{bind}]:{port}")
    } else {
        format!("{bind}:{port}")
    }
}
