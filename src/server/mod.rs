//! # Server Module
//!
//! The HTTP transport: a [`tiny_http`] listener shared by a fixed pool of
//! worker threads. Each worker takes one connection's request at a time,
//! converts it to a [`Request`](crate::dispatcher::Request), runs the
//! [`Service`] synchronously and writes the [`Response`](crate::dispatcher::Response)
//! back. Requests never share state through the transport.

mod http_server;
mod service;

pub use self::http_server::{HttpServer, ServeError, ServerHandle, MAX_BODY_BYTES};
pub use self::service::Service;
