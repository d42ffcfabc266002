//! The HTTP/1.1 transport underneath `apify`
//!
//! This crate is a small, buffered HTTP/1.1 server core built on top of tokio. A request is
//! decoded in full (header section and `Content-Length` body) before it reaches the
//! [`handler::Handler`], and the handler's response body is collected before it is written
//! back, which matches how JSON API endpoints are served: small bodies, one reply each.
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::{Request, Response, StatusCode};
//! use http_body_util::Full;
//! use std::convert::Infallible;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn};
//! use apify_http::connection::HttpConnection;
//! use apify_http::handler::make_handler;
//!
//! #[tokio::main]
//! async fn main() {
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let handler = Arc::new(make_handler(ping));
//!
//!     loop {
//!         let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let handler = handler.clone();
//!         tokio::spawn(async move {
//!             let (reader, writer) = tcp_stream.into_split();
//!             let connection = HttpConnection::new(reader, writer).with_remote_addr(remote_addr);
//!             if let Err(e) = connection.process(handler).await {
//!                 error!("service has error, cause {}, connection shutdown", e);
//!             }
//!         });
//!     }
//! }
//!
//! async fn ping(request: Request<Bytes>) -> Result<Response<Full<Bytes>>, Infallible> {
//!     info!(path = request.uri().path(), "receive request");
//!     Ok(Response::builder().status(StatusCode::OK).body(Full::new(Bytes::from_static(b"pong"))).unwrap())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`codec`]: request decoding and response encoding for `tokio_util::codec`
//! - [`connection`]: the per-connection read/dispatch/write loop
//! - [`handler`]: the [`handler::Handler`] trait and function adapters
//! - [`protocol`]: error types and request extensions populated by the transport
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - `Transfer-Encoding` request bodies are rejected, only `Content-Length` is understood
//! - Maximum header size: 8KB
//! - Maximum number of headers: 64

pub mod codec;
pub mod connection;
pub mod handler;
pub mod protocol;

mod utils;
pub(crate) use utils::ensure;
