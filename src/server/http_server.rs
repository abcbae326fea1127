use super::service::Service;
use crate::dispatcher::{catch_with_trace, write_internal_error, Request, Response};
use http::Method;
use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Largest request body read into memory; bigger bodies get a 413.
pub const MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("address {addr} already in use")]
    AddrInUse { addr: String },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid server configuration: {0}")]
    Config(String),
}

/// Wrapper around a `tiny_http` listener and its worker threads.
pub struct HttpServer<S>(pub S);

/// Handle to a running server.
pub struct ServerHandle {
    addr: SocketAddr,
    server: Arc<tiny_http::Server>,
    workers: Vec<JoinHandle<()>>,
    stopping: Arc<AtomicBool>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Poll the listening address until it accepts connections.
    ///
    /// # Errors
    ///
    /// `TimedOut` when the server is not reachable within ~250ms.
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Stop accepting requests and wait for every worker to finish its
    /// current request.
    pub fn stop(self) {
        self.stopping.store(true, Ordering::SeqCst);
        for _ in &self.workers {
            self.server.unblock();
        }
        for worker in self.workers {
            if worker.join().is_err() {
                warn!("worker thread panicked during shutdown");
            }
        }
        info!(addr = %self.addr, "server stopped");
    }

    /// Block until the workers exit, which only happens after `stop` from
    /// another handle owner or a worker panic.
    ///
    /// # Errors
    ///
    /// The panic payload of the first worker that panicked.
    pub fn join(self) -> thread::Result<()> {
        let mut result = Ok(());
        for worker in self.workers {
            if let Err(e) = worker.join() {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

impl<S: Service> HttpServer<S> {
    /// Bind `addr` and start `workers` threads (at least one).
    ///
    /// # Errors
    ///
    /// [`ServeError::AddrInUse`] when the port is taken, [`ServeError::Bind`]
    /// for every other bind failure.
    pub fn start<A: ToSocketAddrs>(self, addr: A, workers: usize) -> Result<ServerHandle, ServeError> {
        let addr = addr
            .to_socket_addrs()
            .map_err(|e| ServeError::Config(e.to_string()))?
            .next()
            .ok_or_else(|| ServeError::Config("address resolved to nothing".to_string()))?;

        let server = tiny_http::Server::http(addr).map_err(|e| {
            match e.downcast_ref::<io::Error>().map(io::Error::kind) {
                Some(io::ErrorKind::AddrInUse) => ServeError::AddrInUse {
                    addr: addr.to_string(),
                },
                _ => ServeError::Bind {
                    addr: addr.to_string(),
                    source: io::Error::other(e.to_string()),
                },
            }
        })?;
        let bound = server.server_addr().to_ip().unwrap_or(addr);
        let server = Arc::new(server);
        let service = Arc::new(self.0);
        let stopping = Arc::new(AtomicBool::new(false));

        let count = workers.max(1);
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let server = Arc::clone(&server);
            let service = Arc::clone(&service);
            let stopping = Arc::clone(&stopping);
            let handle = thread::Builder::new()
                .name(format!("gantry-worker-{id}"))
                .spawn(move || worker_loop(id, &server, service.as_ref(), &stopping))
                .map_err(|e| ServeError::Bind {
                    addr: bound.to_string(),
                    source: e,
                })?;
            handles.push(handle);
        }
        info!(addr = %bound, workers = count, "server listening");

        Ok(ServerHandle {
            addr: bound,
            server,
            workers: handles,
            stopping,
        })
    }
}

fn worker_loop<S: Service>(id: usize, server: &tiny_http::Server, service: &S, stopping: &AtomicBool) {
    debug!(worker = id, "worker started");
    loop {
        match server.recv() {
            Ok(raw) => handle_one(service, raw),
            Err(e) => {
                if stopping.load(Ordering::SeqCst) {
                    break;
                }
                warn!(worker = id, error = %e, "accept failed");
            }
        }
        if stopping.load(Ordering::SeqCst) {
            break;
        }
    }
    debug!(worker = id, "worker exiting");
}

fn handle_one<S: Service>(service: &S, mut raw: tiny_http::Request) {
    let mut req = match convert_request(&mut raw) {
        Ok(req) => req,
        Err(status) => {
            let reply = tiny_http::Response::from_data(Vec::new()).with_status_code(status);
            if let Err(e) = raw.respond(reply) {
                debug!(error = %e, "failed to reject request");
            }
            return;
        }
    };
    let mut res = Response::new();
    call_contained(service, &mut req, &mut res);

    let request_id = req.request_id;
    if let Err(e) = raw.respond(convert_response(res)) {
        debug!(request_id = %request_id, error = %e, "client went away before response");
    }
}

/// Run the service and turn a panic that escaped it into a 500, so a
/// failure outside the dispatcher's own boundary does not cost a worker.
fn call_contained<S: Service>(service: &S, req: &mut Request, res: &mut Response) {
    if let Err(caught) = catch_with_trace(|| service.call(req, res)) {
        error!(
            request_id = %req.request_id,
            path = %req.path,
            panic_message = %caught.message(),
            backtrace = %caught.backtrace_text(),
            "panic escaped the service"
        );
        res.reset();
        write_internal_error(res);
    }
}

/// Build a [`Request`] from the wire request. Errors carry the status to
/// answer with.
fn convert_request(raw: &mut tiny_http::Request) -> Result<Request, u16> {
    let method = Method::from_bytes(raw.method().to_string().as_bytes()).map_err(|_| 400u16)?;
    let mut req = Request::new(method, raw.url());
    if let Some(addr) = raw.remote_addr() {
        req.remote_addr = Some(*addr);
    }
    for header in raw.headers() {
        req.push_header(header.field.as_str().as_str(), header.value.as_str());
    }

    let mut body = Vec::new();
    let read = raw
        .as_reader()
        .take(MAX_BODY_BYTES + 1)
        .read_to_end(&mut body);
    match read {
        Ok(n) if n as u64 > MAX_BODY_BYTES => {
            warn!(request_id = %req.request_id, path = %req.path, "request body too large");
            Err(413)
        }
        Ok(_) => {
            req.body = body;
            Ok(req)
        }
        Err(e) => {
            warn!(request_id = %req.request_id, error = %e, "failed to read request body");
            Err(400)
        }
    }
}

fn convert_response(res: Response) -> tiny_http::Response<io::Cursor<Vec<u8>>> {
    let (status, headers, cookies, body) = res.into_parts();
    let has_content_type = headers.iter().any(|(k, _)| k.as_ref() == "content-type");
    let mut reply = tiny_http::Response::from_data(body).with_status_code(status);

    let mut push = |name: &str, value: &str| match tiny_http::Header::from_bytes(name.as_bytes(), value.as_bytes()) {
        Ok(h) => reply.add_header(h),
        Err(()) => error!(header = %name, "dropping unrepresentable response header"),
    };
    for (name, value) in &headers {
        push(name, value);
    }
    for cookie in &cookies {
        push("set-cookie", cookie);
    }
    if !has_content_type {
        push("content-type", "text/plain; charset=utf-8");
    }
    reply
}
