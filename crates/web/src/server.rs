//! The TCP host: accepts connections and serves each one on its own task.

use std::fmt::{self, Display};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use apify_http::connection::HttpConnection;
use apify_http::handler::Handler;
use http_body::Body;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

pub struct ServerBuilder<H> {
    handler: Option<H>,
    address: Option<Result<Vec<SocketAddr>, String>>,
}

impl<H> fmt::Debug for ServerBuilder<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerBuilder").field("handler", &self.handler.is_some()).field("address", &self.address).finish()
    }
}

impl<H> ServerBuilder<H> {
    fn new() -> Self {
        Self { handler: None, address: None }
    }

    #[must_use]
    pub fn address<A: ToSocketAddrs>(mut self, address: A) -> Self {
        self.address = Some(address.to_socket_addrs().map(Iterator::collect).map_err(|e| e.to_string()));
        self
    }

    #[must_use]
    pub fn handler(mut self, handler: H) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn build(self) -> Result<Server<H>, ServerBuildError> {
        let handler = self.handler.ok_or(ServerBuildError::MissingHandler)?;
        let address = self.address.ok_or(ServerBuildError::MissingAddress)?.map_err(|reason| ServerBuildError::InvalidAddress { reason })?;
        if address.is_empty() {
            return Err(ServerBuildError::InvalidAddress { reason: "no socket address resolved".to_string() });
        }
        Ok(Server { handler: Arc::new(handler), address })
    }
}

#[derive(Error, Debug)]
pub enum ServerBuildError {
    #[error("handler must be set")]
    MissingHandler,
    #[error("address must be set")]
    MissingAddress,
    #[error("invalid address: {reason}")]
    InvalidAddress { reason: String },
}

#[derive(Debug)]
pub struct Server<H> {
    handler: Arc<H>,
    address: Vec<SocketAddr>,
}

impl<H> Server<H>
where
    H: Handler + 'static,
    <H::RespBody as Body>::Error: Display,
{
    pub fn builder() -> ServerBuilder<H> {
        ServerBuilder::new()
    }

    /// Installs an INFO level fmt subscriber, unless one is already set, then binds and serves.
    pub async fn start(self) {
        let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            warn!("global subscriber already set, keep using it");
        }

        info!("start listening at {:?}", self.address);
        let tcp_listener = match TcpListener::bind(self.address.as_slice()).await {
            Ok(tcp_listener) => tcp_listener,
            Err(e) => {
                error!(cause = %e, "bind server error");
                return;
            }
        };

        self.serve(tcp_listener).await;
    }

    /// Accepts connections from `tcp_listener` until the task is dropped.
    pub async fn serve(self, tcp_listener: TcpListener) {
        loop {
            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(stream_and_addr) => stream_and_addr,
                Err(e) => {
                    warn!(cause = %e, "failed to accept");
                    continue;
                }
            };

            let handler = self.handler.clone();

            tokio::spawn(async move {
                let (reader, writer) = tcp_stream.into_split();
                let connection = HttpConnection::new(reader, writer).with_remote_addr(remote_addr);
                match connection.process(handler).await {
                    Ok(()) => {
                        info!(%remote_addr, "finished process, connection shutdown");
                    }
                    Err(e) => {
                        error!("service has error, cause {}, connection shutdown", e);
                    }
                }
            });
        }
    }
}
